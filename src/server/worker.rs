//! Multi-process worker pool.
//!
//! The pool re-executes a server binary N times with `--worker <index>`. Each
//! child binds the same address with address reuse enabled and runs its own
//! dispatcher, so the kernel spreads incoming connections across them. The
//! children share nothing. A worker that exits is logged and not restarted.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitStatus;

use anyhow::Context;
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

use crate::config::Config;

/// How to launch the workers.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    program: PathBuf,
    args: Vec<OsString>,
    size: usize,
}

/// A launched worker process.
#[derive(Debug)]
pub struct Worker {
    pub index: usize,
    child: Child,
}

/// The workers of a started pool.
#[derive(Debug)]
pub struct RunningPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    /// `args` are passed to every child ahead of `--worker <index>`.
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>, size: usize) -> Self {
        Self {
            program: program.into(),
            args,
            size,
        }
    }

    /// Workers that re-run the current executable with its own arguments.
    pub fn from_current_exe(size: usize) -> anyhow::Result<Self> {
        let program = std::env::current_exe().context("locating current executable")?;
        let args = std::env::args_os().skip(1).collect();
        Ok(Self::new(program, args, size))
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Launches every worker. Must be called inside a tokio runtime.
    ///
    /// If a launch fails, workers already started are killed when the
    /// partially built pool is dropped.
    pub fn spawn(&self) -> anyhow::Result<RunningPool> {
        let mut workers = Vec::with_capacity(self.size);

        for index in 0..self.size {
            let child = Command::new(&self.program)
                .args(&self.args)
                .arg("--worker")
                .arg(index.to_string())
                .kill_on_drop(true)
                .spawn()
                .with_context(|| {
                    format!("spawning worker {index} ({})", self.program.display())
                })?;

            info!(index, pid = child.id(), "worker started");
            workers.push(Worker { index, child });
        }

        Ok(RunningPool { workers })
    }
}

impl RunningPool {
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// OS process ids of workers that have not been reaped.
    pub fn pids(&self) -> Vec<u32> {
        self.workers.iter().filter_map(|w| w.child.id()).collect()
    }

    /// Number of workers still running, without blocking.
    pub fn running(&mut self) -> usize {
        self.workers
            .iter_mut()
            .map(|w| w.child.try_wait())
            .filter(|status| matches!(status, Ok(None)))
            .count()
    }

    /// Waits for every worker to exit and returns how many exited
    /// unsuccessfully. Crashed workers are not restarted.
    pub async fn wait(&mut self) -> usize {
        let mut failed = 0;

        for worker in &mut self.workers {
            match worker.child.wait().await {
                Ok(status) => {
                    if !log_exit(worker.index, status) {
                        failed += 1;
                    }
                }
                Err(e) => {
                    error!(index = worker.index, error = %e, "failed to wait for worker");
                    failed += 1;
                }
            }
        }

        failed
    }

    /// Kills every worker and reaps it.
    pub async fn shutdown(&mut self) {
        for worker in &mut self.workers {
            if let Err(e) = worker.child.start_kill() {
                warn!(index = worker.index, error = %e, "failed to signal worker");
            }
        }

        for worker in &mut self.workers {
            if let Ok(status) = worker.child.wait().await {
                log_exit(worker.index, status);
            }
        }
    }
}

fn log_exit(index: usize, status: ExitStatus) -> bool {
    if status.success() {
        info!(index, %status, "worker exited");
    } else {
        warn!(index, %status, "worker exited abnormally; not restarting");
    }
    status.success()
}

/// Runs a pool of `cfg.server.workers` copies of this binary until they all
/// exit or Ctrl-C arrives.
pub async fn supervise(cfg: &Config) -> anyhow::Result<()> {
    let pool = WorkerPool::from_current_exe(cfg.server.workers)?;
    let mut running = pool.spawn()?;
    info!(workers = running.len(), "worker pool started");

    let failed = tokio::select! {
        failed = running.wait() => Some(failed),
        _ = tokio::signal::ctrl_c() => None,
    };

    match failed {
        Some(failed) => info!(failed, "all workers exited"),
        None => {
            info!("Shutdown signal received");
            running.shutdown().await;
        }
    }

    Ok(())
}

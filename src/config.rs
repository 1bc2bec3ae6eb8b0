use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

use crate::http::connection::Limits;

/// Command-line surface. Every option is optional so that unset flags leave
/// values from the config file (or the defaults) untouched.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "lantern", about = "Simple asynchronous web-server")]
pub struct Args {
    /// YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// Log level: trace, debug, info, warn or error
    #[arg(long = "log")]
    pub log_level: Option<String>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    pub logfile: Option<PathBuf>,

    /// Number of worker processes
    #[arg(short = 'w')]
    pub workers: Option<usize>,

    /// Document root
    #[arg(short = 'r')]
    pub document_root: Option<PathBuf>,

    /// Run as worker N of a pool (set by the pool itself)
    #[arg(long, hide = true)]
    pub worker: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub document_root: PathBuf,
    pub backlog: i32,
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            workers: 1,
            document_root: PathBuf::from("."),
            backlog: 128,
            max_header_bytes: limits.max_header_bytes,
            max_body_bytes: limits.max_body_bytes,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl ServerConfig {
    /// Resolves `host:port` to the first matching socket address.
    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("resolving {}:{}", self.host, self.port))?
            .next()
            .with_context(|| format!("{}:{} resolved to no address", self.host, self.port))
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_header_bytes: self.max_header_bytes,
            max_body_bytes: self.max_body_bytes,
        }
    }
}

impl Config {
    /// Defaults, then the YAML file named by `--config`, then CLI flags.
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let mut cfg = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        cfg.apply_args(args);
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = &args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(workers) = args.workers {
            self.server.workers = workers;
        }
        if let Some(root) = &args.document_root {
            self.server.document_root = root.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(file) = &args.logfile {
            self.logging.file = Some(file.clone());
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.workers == 0 {
            anyhow::bail!("worker count must be at least 1");
        }
        if self.server.max_header_bytes == 0 {
            anyhow::bail!("max_header_bytes must be positive");
        }
        self.logging
            .level
            .parse::<tracing::Level>()
            .map_err(|_| anyhow::anyhow!("unknown log level {:?}", self.logging.level))?;
        Ok(())
    }
}

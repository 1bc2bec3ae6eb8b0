use std::io;
use std::net::SocketAddr;

use anyhow::Context;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{Instrument, info, info_span};

use crate::config::Config;
use crate::http::connection::Service;
use crate::http::router::Router;
use crate::server::dispatcher::Dispatcher;

/// Binds a non-blocking listening socket with address reuse enabled, so that
/// several worker processes can bind the same `addr`.
pub fn bind(addr: SocketAddr, backlog: i32) -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    Ok(socket.into())
}

/// Builds a dispatcher for `cfg` on a freshly bound socket.
pub fn build_dispatcher(cfg: &Config) -> anyhow::Result<Dispatcher> {
    let addr = cfg.server.listen_addr()?;
    let listener =
        bind(addr, cfg.server.backlog).with_context(|| format!("binding {addr}"))?;
    let service = Service::new(Router::default(), cfg.server.limits());
    Ok(Dispatcher::new(listener, service)?)
}

/// Serves on this process until Ctrl-C. `worker` is the pool index when
/// running as a pool child.
pub async fn run(cfg: &Config, worker: Option<usize>) -> anyhow::Result<()> {
    let span = info_span!("worker", index = worker.unwrap_or(0), pid = std::process::id());

    async {
        let mut dispatcher = build_dispatcher(cfg)?;
        info!(
            "Listening on {} (document root {})",
            dispatcher.local_addr()?,
            cfg.server.document_root.display()
        );

        let handle = dispatcher.handle();
        let loop_span = tracing::Span::current();
        let mut task =
            tokio::task::spawn_blocking(move || loop_span.in_scope(|| dispatcher.run()));

        let finished = tokio::select! {
            res = &mut task => Some(res),
            _ = tokio::signal::ctrl_c() => None,
        };

        match finished {
            Some(res) => res??,
            None => {
                info!("Shutdown signal received");
                handle.stop()?;
                task.await??;
            }
        }

        Ok::<(), anyhow::Error>(())
    }
    .instrument(span)
    .await
}

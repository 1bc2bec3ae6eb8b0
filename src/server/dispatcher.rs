//! Readiness-driven event loop.
//!
//! One `Dispatcher` owns a listening socket and every connection accepted
//! from it. Each turn polls the OS for ready sockets and services each one
//! exactly once; no socket operation ever blocks the loop.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, info, trace, warn};

use crate::http::connection::{Connection, Flow, Service};

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CONNECTION: usize = 2;

const EVENTS_CAPACITY: usize = 1024;

pub struct Dispatcher {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    service: Service,
    stopped: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

/// Stops a running [`Dispatcher`] from another thread.
#[derive(Clone)]
pub struct DispatcherHandle {
    stopped: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl DispatcherHandle {
    /// Asks the loop to exit after its current turn.
    pub fn stop(&self) -> io::Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        self.waker.wake()
    }
}

impl Dispatcher {
    /// Takes ownership of a bound listening socket.
    pub fn new(listener: std::net::TcpListener, service: Service) -> io::Result<Self> {
        listener.set_nonblocking(true)?;
        let mut listener = TcpListener::from_std(listener);

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            listener,
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION,
            service,
            stopped: Arc::new(AtomicBool::new(false)),
            waker,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle {
            stopped: self.stopped.clone(),
            waker: self.waker.clone(),
        }
    }

    /// Number of open client connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Runs turns until stopped through a [`DispatcherHandle`]. Open
    /// connections are dropped on exit.
    pub fn run(&mut self) -> io::Result<()> {
        info!(addr = ?self.listener.local_addr().ok(), "dispatcher running");

        while !self.stopped.load(Ordering::SeqCst) {
            self.turn(None)?;
        }

        let open = self.connections.len();
        for (token, mut conn) in self.connections.drain() {
            if let Err(e) = self.poll.registry().deregister(conn.stream_mut()) {
                trace!(token = token.0, error = %e, "deregister failed");
            }
        }
        info!(open_connections = open, "dispatcher stopped");
        Ok(())
    }

    /// One loop iteration: wait up to `timeout` for readiness, then service
    /// every ready socket once. Returns the number of events handled.
    pub fn turn(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(0),
            Err(e) => return Err(e),
        }

        let ready: Vec<(Token, bool, bool)> = self
            .events
            .iter()
            .map(|event| {
                (
                    event.token(),
                    event.is_readable() || event.is_read_closed() || event.is_error(),
                    event.is_writable(),
                )
            })
            .collect();

        for &(token, readable, writable) in &ready {
            match token {
                LISTENER => self.accept(),
                WAKER => trace!("dispatcher woken"),
                token => self.service_connection(token, readable, writable),
            }
        }

        Ok(ready.len())
    }

    fn accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;

                    if let Err(e) = self.poll.registry().register(
                        &mut stream,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    ) {
                        warn!(%peer, error = %e, "failed to register connection");
                        continue;
                    }

                    debug!(%peer, token = token.0, "accepted connection");
                    self.connections
                        .insert(token, Connection::new(stream, peer, &self.service.limits));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Readiness is edge-triggered: without re-arming, connections
                    // still queued in the backlog wait for the next new arrival.
                    warn!(error = %e, "accept failed; retrying next turn");
                    self.rearm_listener();
                    break;
                }
            }
        }
    }

    fn rearm_listener(&mut self) {
        if let Err(e) =
            self.poll
                .registry()
                .reregister(&mut self.listener, LISTENER, Interest::READABLE)
        {
            warn!(error = %e, "failed to re-arm listener");
        }
    }

    fn service_connection(&mut self, token: Token, readable: bool, writable: bool) {
        let Some(conn) = self.connections.get_mut(&token) else {
            trace!(token = token.0, "event for released connection");
            return;
        };

        match conn.ready(readable, writable, &self.service) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Close) => self.release(token),
            Err(e) => {
                debug!(peer = %conn.peer(), error = %e, "transport error");
                self.release(token);
            }
        }
    }

    fn release(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            if let Err(e) = self.poll.registry().deregister(conn.stream_mut()) {
                trace!(token = token.0, error = %e, "deregister failed");
            }
            debug!(peer = %conn.peer(), token = token.0, "connection closed");
        }
    }
}

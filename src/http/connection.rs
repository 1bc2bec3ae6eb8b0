use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr};
use std::time::SystemTime;

use bytes::Bytes;
use mio::net::TcpStream;
use tracing::{debug, info, trace, warn};

use crate::http::framer::{Framing, RequestFramer};
use crate::http::parser::{ParseError, parse_request_head};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::router::{Admission, Router};
use crate::http::writer::{ResponseWriter, response_version};

const READ_CHUNK: usize = 4096;

/// Source of the `Date` header.
pub type Clock = fn() -> SystemTime;

/// Inbound size bounds for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_header_bytes: 64 * 1024,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Everything a connection needs from its dispatcher to answer a request.
pub struct Service {
    pub router: Router,
    pub limits: Limits,
    pub clock: Clock,
}

impl Service {
    pub fn new(router: Router, limits: Limits) -> Self {
        Self {
            router,
            limits,
            clock: SystemTime::now,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn date(&self) -> String {
        httpdate::fmt_http_date((self.clock)())
    }
}

impl Default for Service {
    fn default() -> Self {
        Self::new(Router::default(), Limits::default())
    }
}

/// Connection state. Strictly linear; `Closed` is the only terminal state.
#[derive(Debug)]
pub enum State {
    AwaitingHeaders,
    HeadersReady(Result<Request, ParseError>),
    AwaitingBody(Request),
    Dispatching { request: Request, body: Bytes },
    Responding(ResponseWriter),
    Closed,
}

/// Data-free view of [`State`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingHeaders,
    HeadersReady,
    AwaitingBody,
    Dispatching,
    Responding,
    Closed,
}

/// Protocol side of one connection: framing, parsing, routing and the
/// outbound response. Performs no I/O itself.
#[derive(Debug)]
pub struct ConnectionHandler {
    framer: RequestFramer,
    state: State,
}

impl ConnectionHandler {
    pub fn new(limits: &Limits) -> Self {
        Self {
            framer: RequestFramer::with_limit(limits.max_header_bytes),
            state: State::AwaitingHeaders,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::AwaitingHeaders => Phase::AwaitingHeaders,
            State::HeadersReady(_) => Phase::HeadersReady,
            State::AwaitingBody(_) => Phase::AwaitingBody,
            State::Dispatching { .. } => Phase::Dispatching,
            State::Responding(_) => Phase::Responding,
            State::Closed => Phase::Closed,
        }
    }

    /// Whether more inbound bytes can still change the outcome.
    pub fn accepts_input(&self) -> bool {
        matches!(self.state, State::AwaitingHeaders | State::AwaitingBody(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    /// Feeds bytes read from the peer. Bytes arriving after the request is
    /// complete are discarded.
    pub fn receive(&mut self, chunk: &[u8], service: &Service) {
        if !self.accepts_input() {
            trace!(len = chunk.len(), phase = ?self.phase(), "discarding late bytes");
            return;
        }

        match self.framer.push(chunk) {
            Ok(Framing::NeedMore) => {}
            Ok(Framing::Complete(frame)) => {
                self.state = match std::mem::replace(&mut self.state, State::Closed) {
                    State::AwaitingHeaders => State::HeadersReady(parse_request_head(&frame)),
                    State::AwaitingBody(request) => State::Dispatching {
                        request,
                        body: frame,
                    },
                    other => other,
                };
                self.advance(service);
            }
            Err(e) => {
                warn!(error = %e, "rejecting oversized request head");
                self.respond(Response::bad_request(), None, service);
            }
        }
    }

    /// Runs transitions that need no further input.
    fn advance(&mut self, service: &Service) {
        loop {
            match std::mem::replace(&mut self.state, State::Closed) {
                State::HeadersReady(Err(e)) => {
                    debug!(error = %e, "malformed request");
                    self.respond(Response::bad_request(), None, service);
                }

                State::HeadersReady(Ok(request)) => match service.router.admit(&request.method) {
                    Admission::Forbidden => {
                        self.respond(Response::forbidden(), Some(&request), service);
                    }
                    Admission::Unrecognized => {
                        self.respond(Response::method_not_allowed(), Some(&request), service);
                    }
                    Admission::Admitted => self.await_body(request, service),
                },

                State::Dispatching { request, body } => {
                    let response = match service.router.handler(&request.method) {
                        Some(handler) => handler.call(&request, &body),
                        None => Response::method_not_allowed(),
                    };
                    self.respond(response, Some(&request), service);
                }

                other => {
                    self.state = other;
                    return;
                }
            }
        }
    }

    fn await_body(&mut self, request: Request, service: &Service) {
        match request.content_length() {
            Ok(0) => {
                self.state = State::Dispatching {
                    request,
                    body: Bytes::new(),
                };
            }
            Ok(n) if n <= service.limits.max_body_bytes => {
                self.framer.expect_length(n);
                match self.framer.push(&[]) {
                    Ok(Framing::Complete(body)) => {
                        self.state = State::Dispatching { request, body };
                    }
                    _ => self.state = State::AwaitingBody(request),
                }
            }
            Ok(n) => {
                warn!(length = n, limit = service.limits.max_body_bytes, "request body too large");
                self.respond(Response::bad_request(), Some(&request), service);
            }
            Err(e) => {
                debug!(error = %e, "invalid Content-Length");
                self.respond(Response::bad_request(), Some(&request), service);
            }
        }
    }

    fn respond(&mut self, response: Response, request: Option<&Request>, service: &Service) {
        let version = response_version(request.map(|r| r.version.as_str()));

        match request {
            Some(req) => info!(
                method = %req.method,
                target = %req.target,
                status = response.status.as_u16(),
                "request handled"
            ),
            None => info!(status = response.status.as_u16(), "request rejected"),
        }

        self.framer.clear_terminator();
        self.state = State::Responding(ResponseWriter::new(&response, version, &service.date()));
    }

    /// The outbound response, once there is one.
    pub fn writer(&mut self) -> Option<&mut ResponseWriter> {
        match &mut self.state {
            State::Responding(writer) => Some(writer),
            _ => None,
        }
    }

    /// Moves to `Closed` once the response is fully written.
    pub fn finish_write(&mut self) {
        if let State::Responding(writer) = &self.state {
            if writer.is_finished() {
                self.state = State::Closed;
            }
        }
    }

    /// The peer shut its write side. A pending request can never complete, so
    /// the connection closes without a response; a response already queued is
    /// still delivered.
    pub fn peer_closed(&mut self) {
        if self.accepts_input() {
            debug!(buffered = self.framer.buffered(), "peer closed before request completed");
            self.state = State::Closed;
        }
    }
}

/// Outcome of servicing a readiness event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// An accepted socket together with its protocol state.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    handler: ConnectionHandler,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, limits: &Limits) -> Self {
        Self {
            stream,
            peer,
            handler: ConnectionHandler::new(limits),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Services one readiness event. Never blocks: reads and writes stop at
    /// `WouldBlock`. Transport errors are returned for the caller to tear the
    /// connection down.
    pub fn ready(&mut self, readable: bool, writable: bool, service: &Service) -> io::Result<Flow> {
        if readable {
            self.fill(service)?;
        }

        // A response produced by this read can usually go out immediately.
        if readable || writable {
            self.flush()?;
        }

        if self.handler.is_closed() {
            Ok(Flow::Close)
        } else {
            Ok(Flow::Continue)
        }
    }

    fn fill(&mut self, service: &Service) -> io::Result<()> {
        let mut buf = [0u8; READ_CHUNK];

        while self.handler.accepts_input() {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    self.handler.peer_closed();
                    break;
                }
                Ok(n) => self.handler.receive(&buf[..n], service),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        let Some(writer) = self.handler.writer() else {
            return Ok(());
        };

        if writer.write_to(&mut self.stream)? {
            self.handler.finish_write();
            if let Err(e) = self.stream.shutdown(Shutdown::Write) {
                trace!(peer = %self.peer, error = %e, "shutdown after response failed");
            }
        }

        Ok(())
    }
}

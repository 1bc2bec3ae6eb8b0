use std::io::{self, Write};

use bytes::{BufMut, Bytes, BytesMut};

use crate::http::response::Response;

pub const HTTP_VERSION: &str = "HTTP/1.1";

/// Picks the protocol token for the status line: the request's own version
/// when it looks like `HTTP/x.y`, otherwise [`HTTP_VERSION`].
pub fn response_version(request_version: Option<&str>) -> &str {
    match request_version {
        Some(v) if v.starts_with("HTTP/") => v,
        _ => HTTP_VERSION,
    }
}

/// Encodes a response head in emission order.
///
/// The status line is written on construction. `finish` ends the header block
/// and appends the body, consuming the encoder, so no header can follow a
/// body byte.
pub struct HeadEncoder {
    buf: BytesMut,
}

impl HeadEncoder {
    pub fn status_line(version: &str, status: u16, reason: &str) -> Self {
        let mut buf = BytesMut::with_capacity(256);
        buf.put_slice(format!("{version} {status} {reason}\r\n").as_bytes());
        Self { buf }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.buf.put_slice(name.as_bytes());
        self.buf.put_slice(b": ");
        self.buf.put_slice(value.as_bytes());
        self.buf.put_slice(b"\r\n");
        self
    }

    /// Terminates the header block with a blank line and appends `body`.
    pub fn finish(mut self, body: &[u8]) -> Bytes {
        self.buf.reserve(2 + body.len());
        self.buf.put_slice(b"\r\n");
        self.buf.put_slice(body);
        self.buf.freeze()
    }
}

/// Serializes `resp` with the managed headers first, in fixed order:
/// Date, Content-Type, Content-Length, Connection.
pub fn serialize_response(resp: &Response, version: &str, date: &str) -> Bytes {
    let content_length = resp.body.len().to_string();

    let head = HeadEncoder::status_line(version, resp.status.as_u16(), &resp.reason)
        .header("Date", date)
        .header("Content-Type", &resp.content_type)
        .header("Content-Length", &content_length)
        .header("Connection", "close");

    resp.headers
        .iter()
        .fold(head, |head, (k, v)| head.header(k, v))
        .finish(&resp.body)
}

/// Outbound queue for one serialized response. Tracks how much has reached
/// the socket so partial non-blocking writes can resume.
#[derive(Debug)]
pub struct ResponseWriter {
    buffer: Bytes,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: &Response, version: &str, date: &str) -> Self {
        Self {
            buffer: serialize_response(response, version, date),
            written: 0,
        }
    }

    /// Bytes not yet written.
    pub fn pending(&self) -> &[u8] {
        &self.buffer[self.written..]
    }

    pub fn advance(&mut self, n: usize) {
        self.written = (self.written + n).min(self.buffer.len());
    }

    pub fn is_finished(&self) -> bool {
        self.written == self.buffer.len()
    }

    /// The whole serialized response, including already written bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Writes as much as the sink accepts without blocking.
    ///
    /// Returns `Ok(true)` once everything is written, `Ok(false)` if the sink
    /// reported `WouldBlock` first.
    pub fn write_to<W: Write>(&mut self, sink: &mut W) -> io::Result<bool> {
        while !self.is_finished() {
            match sink.write(self.pending()) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed while writing",
                    ));
                }
                Ok(n) => self.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(true)
    }
}

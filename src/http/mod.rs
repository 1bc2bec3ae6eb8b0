//! HTTP protocol implementation.
//!
//! A deliberately small HTTP/1.x subset: one request per connection, no
//! chunked transfer, no pipelining. Every response carries `Connection: close`.
//!
//! # Architecture
//!
//! - **`framer`**: Buffers inbound bytes until the end-of-headers terminator
//! - **`parser`**: Turns a header block into a [`request::Request`]
//! - **`request`**: Request head, methods and the ordered header list
//! - **`response`**: Status codes, the error table and the response builder
//! - **`router`**: Method allow-list and method → handler table
//! - **`writer`**: Serializes responses in a fixed emission order
//! - **`connection`**: The per-connection state machine and its socket shell
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌──────────────────┐
//!        │ AwaitingHeaders  │ ← Feed bytes to the framer
//!        └────────┬─────────┘
//!                 │ Terminator seen, head parsed
//!                 ▼
//!        ┌──────────────────┐  parse error ─────────────► 400
//!        │  HeadersReady    │  forbidden method ────────► 403
//!        └────────┬─────────┘  unrecognized method ─────► 405
//!                 │ Admitted (drain Content-Length body if any)
//!                 ▼
//!        ┌──────────────────┐
//!        │   Dispatching    │ ← Handler for the method, or 405
//!        └────────┬─────────┘
//!                 ▼
//!        ┌──────────────────┐
//!        │   Responding     │ ← Status line, headers, body
//!        └────────┬─────────┘
//!                 ▼
//!              Closed
//! ```

pub mod connection;
pub mod framer;
pub mod parser;
pub mod request;
pub mod response;
pub mod router;
pub mod writer;

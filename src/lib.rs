//! Lantern - a small non-blocking HTTP server
//!
//! Core library for request framing, parsing, dispatch and the worker pool.

pub mod config;
pub mod http;
pub mod server;

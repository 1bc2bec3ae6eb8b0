//! Process-level serving.
//!
//! - **`dispatcher`**: Single-threaded readiness loop over one listening socket
//! - **`listener`**: Address-reusing bind and the single-process entry point
//! - **`worker`**: Pool of independent worker processes

pub mod dispatcher;
pub mod listener;
pub mod worker;

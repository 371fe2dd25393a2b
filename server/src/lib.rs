//! kiln cache server.
//!
//! A TCP server speaking a line-oriented text protocol over a
//! byte-budgeted LRU cache. Connections are served by blocking reads
//! on a dynamic thread pool; the acceptor bounds how many are live at
//! once and shuts the whole thing down in order.

pub mod acceptor;
pub mod banner;
pub mod config;
pub mod connection;
pub mod execute;
pub mod logging;
pub mod metrics;
pub mod pool;
pub mod signal;

pub use acceptor::Server;
pub use config::Config;

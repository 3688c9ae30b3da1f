//! Reactor-driven HTTP/1.1 connection engine.
//!
//! One reactor thread owns all sockets and drives each connection through a
//! request/response state machine with non-blocking I/O: strict head
//! parsing, optional `Expect: 100-continue` interludes, keep-alive reuse,
//! chunked streaming responses pulled from a handler callback, and an
//! optional worker pool that takes handler execution off the reactor.

pub mod config;
pub mod cors;
pub mod handler;
pub mod prelude;
pub mod server;
pub mod worker;

mod connection;
mod engine;

pub use config::ServerConfig;
pub use connection::ConnState;
pub use cors::CorsConfig;
pub use handler::{HandlerAction, Router};
pub use server::{HttpServer, Result, ServerError, ServerHandle};
pub use worker::ThreadPool;

#[cfg(test)]
mod tests;

//! Inbound HTTP adapter.

pub mod handlers;
pub mod rate_limit;
mod server;

pub use server::HttpServer;

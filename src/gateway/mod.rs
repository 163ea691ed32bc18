//! # Gateway Module
//!
//! The proxy controller and the HTTP server that hosts it.

pub mod controller;
pub mod server;

pub use controller::{CachePolicy, ProxyController};
pub use server::{build_router, AppState, ProxyServer};

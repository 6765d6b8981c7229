//! Reference TCP host container.
//!
//! This module contains:
//! - `frame`: Length-prefixed frame reading charged against the packet budget
//! - `handler`: Client connection handler and packet dispatch trait
//! - `server`: TCP accept loop driving the service lifecycle hooks

pub mod frame;
pub mod handler;
pub mod server;

// Re-export main entry points
pub use handler::{EchoHandler, PacketHandler};
pub use server::{serve, serve_listener};

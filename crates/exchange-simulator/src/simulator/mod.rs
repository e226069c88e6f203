//! The simulator engine and its transport binding.
//!
//! # Module Structure
//!
//! - `core` - Routing and HTTP dispatch with the response timing contract
//! - `session` - WebSocket session loop and upstream relay
//! - `server` - hyper accept loop, WebSocket upgrade, metrics endpoint

mod core;
mod server;
mod session;

pub use self::core::{Route, Simulator, INVALID_ENDPOINT, INVALID_MESSAGE, INVALID_REQUEST};
pub use server::{error_response, serve, serve_metrics};

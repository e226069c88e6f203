//! Rule-based exchange simulator.
//!
//! Answers HTTP requests and WebSocket messages with rule-matched, delayed
//! responses, relays WebSocket sessions to a real upstream while recording its
//! traffic, and replays recordings with their original timing.

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod recording;
pub mod simulator;
pub mod timing;
pub mod ws;

pub use config::Config;
pub use error::{Result, SimulatorError};
pub use simulator::{serve, Simulator};

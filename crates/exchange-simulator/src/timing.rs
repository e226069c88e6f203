//! Deadline helpers for artificial response delays.
//!
//! Delays are converted into absolute deadlines measured from the start of a call,
//! so handler processing time is absorbed by the delay instead of added to it.

use crate::error::{Result, SimulatorError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub fn deadline(start: Instant, delay: Duration) -> Instant {
    start + delay
}

/// Sleeps until `deadline`, returning [`SimulatorError::Cancelled`] if the token fires first.
pub async fn wait_until(deadline: Instant, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(SimulatorError::Cancelled),
        _ = tokio::time::sleep_until(deadline) => Ok(()),
    }
}

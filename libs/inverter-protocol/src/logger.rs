//! Device diagnostics sink
//!
//! Thin structured layer over `tracing`: every event carries the device label
//! and endpoint so several adapters can share one subscriber.

use std::fmt;

use crate::session::SessionState;

/// Per-device logger injected into the adapter, session and link
#[derive(Debug, Clone)]
pub struct DeviceLogger {
    device: String,
    endpoint: String,
}

impl DeviceLogger {
    pub fn new(device: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            endpoint: endpoint.into(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Log adapter construction
    pub fn log_init(&self, message: &str) {
        tracing::info!(device = %self.device, "[INIT] {} - {}", self.endpoint, message);
    }

    /// Log connection attempt outcome
    pub fn log_connect(&self, details: &str) {
        tracing::info!(device = %self.device, "[CONNECT] {} - {}", self.endpoint, details);
    }

    pub fn log_disconnect(&self, reason: &str) {
        tracing::info!(device = %self.device, "[DISCONNECT] {} - {}", self.endpoint, reason);
    }

    /// Log session state change
    pub fn log_status(&self, old_state: SessionState, new_state: SessionState, reason: &str) {
        tracing::debug!(
            device = %self.device,
            "[STATUS] {} -> {} - {}",
            old_state,
            new_state,
            reason
        );
    }

    /// Log retry attempt
    pub fn log_retry(&self, attempt: u32, max_attempts: u32, delay_ms: u64, reason: &str) {
        tracing::warn!(
            device = %self.device,
            "[RETRY] Attempt {}/{}, delay {}ms - {}",
            attempt,
            max_attempts,
            delay_ms,
            reason
        );
    }

    /// Log a failed operation
    pub fn log_error(&self, operation: &str, error: &dyn fmt::Display) {
        tracing::error!(device = %self.device, "[ERROR] {} - {}", operation, error);
    }

    /// Log one request or response on the wire
    pub fn log_frame(&self, direction: &str, summary: &str) {
        tracing::debug!(device = %self.device, "[{}] {}", direction, summary);
    }

    /// Log decoded parameter
    pub fn log_parsed(&self, parameter: &str, words: &[u16], value: &dyn fmt::Display) {
        tracing::trace!(
            device = %self.device,
            "[PARSED] {} regs={:04X?} value={}",
            parameter,
            words,
            value
        );
    }
}

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::store::StoreError;

/// A persistence problem the engine recovered from.
#[derive(Error, Debug)]
pub enum StoreWarning {
    /// The previous state could not be read, the park starts with every point unplugged.
    #[error("Could not recover state, starting empty: {0}")]
    ReadFailed(StoreError),
    /// The state could not be saved, memory stays authoritative.
    #[error("Failed to save current state: {0}")]
    SaveFailed(StoreError),
}

/// Receives the warnings the engine does not fail on.
pub trait Reporter: Send + Sync {
    fn report_warning(&self, warning: &StoreWarning);
}

/// Forwards warnings to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report_warning(&self, warning: &StoreWarning) {
        tracing::warn!("{}", warning);
    }
}

/// Source of plug-in timestamps.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

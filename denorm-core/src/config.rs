//! Cascade execution settings.

use serde::{Deserialize, Serialize};

/// Default capacity of the background job channel.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// When cascades run relative to the primary write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeMode {
    /// The cascade completes before `save`/`delete` returns.
    #[default]
    Synchronous,
    /// The cascade is queued and applied by a background worker. Copies become
    /// visible eventually; failures are logged, not returned.
    Background,
}

/// Settings for a [`DocumentStore`](crate::store::DocumentStore).
///
/// Deserializable so hosts can embed it in their own configuration files; missing
/// keys fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    pub mode: CascadeMode,
    /// Jobs buffered before `save` waits for the worker. Only used in background mode.
    pub queue_capacity: usize,
}

impl CascadeConfig {
    pub fn with_mode(mut self, mode: CascadeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn is_background(&self) -> bool {
        self.mode == CascadeMode::Background
    }
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            mode: CascadeMode::Synchronous,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{compactor::CompactionPolicy, engine::DEFAULT_ROTATION_THRESHOLD_BYTES};
use std::time::Duration;

/// Store configuration
pub struct Config {
    /// Size past which the active segment rotates on its next append
    pub(crate) rotation_threshold_bytes: u64,

    /// Period between compactor passes
    pub(crate) compaction_interval: Duration,

    /// Which compaction strategy the background loop runs
    pub(crate) compaction_policy: CompactionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rotation_threshold_bytes: DEFAULT_ROTATION_THRESHOLD_BYTES,
            compaction_interval: Duration::from_secs(10),
            compaction_policy: CompactionPolicy::CleanUnreferenced,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the size past which the active segment rotates on its next append.
    ///
    /// Default = 1 MiB
    #[must_use]
    pub fn rotation_threshold_bytes(mut self, bytes: u64) -> Self {
        self.rotation_threshold_bytes = bytes;
        self
    }

    /// Sets the period between compactor passes.
    ///
    /// Default = 10 seconds
    #[must_use]
    pub fn compaction_interval(mut self, interval: Duration) -> Self {
        self.compaction_interval = interval;
        self
    }

    /// Sets which compaction strategy the background loop runs.
    ///
    /// Default = [`CompactionPolicy::CleanUnreferenced`]
    #[must_use]
    pub fn compaction_policy(mut self, policy: CompactionPolicy) -> Self {
        self.compaction_policy = policy;
        self
    }
}

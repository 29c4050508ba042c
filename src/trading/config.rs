//! Sync engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the sync orchestrator and scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Our wallet address (the follower)
    pub follower_address: Option<String>,

    /// Interval between scheduled sync cycles (seconds)
    pub poll_interval_secs: u64,

    /// How long shutdown waits for an in-flight cycle (seconds)
    pub shutdown_grace_secs: u64,

    /// Log instructions instead of placing orders
    pub dry_run: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            follower_address: None,
            poll_interval_secs: 60,
            shutdown_grace_secs: 30,
            dry_run: true,
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Follower address, ignoring blank values.
    pub fn follower(&self) -> Option<&str> {
        self.follower_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }
}

//! How long to wait before trying the chat client again.
//!
//! The chat client may simply not be running yet, so the default policy
//! never gives up. A bounded policy is available for hosts that would
//! rather surface an error after a while.

use std::time::Duration;

/// Waiting rules between connection attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Pause after a full endpoint scan found nothing.
    pub scan_cooldown: Duration,
    /// Pause after an established connection was lost.
    pub reconnect_delay: Duration,
    /// Give up after this many consecutive failed scans. `None` retries
    /// forever.
    pub max_scans: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            scan_cooldown: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(5),
            max_scans: None,
        }
    }
}

impl ReconnectPolicy {
    /// Retries forever, waiting `scan_cooldown` between failed scans.
    pub fn unbounded(scan_cooldown: Duration) -> Self {
        Self {
            scan_cooldown,
            ..Self::default()
        }
    }

    /// Gives up after `max_scans` consecutive failed scans.
    pub fn bounded(scan_cooldown: Duration, max_scans: u32) -> Self {
        Self {
            scan_cooldown,
            max_scans: Some(max_scans),
            ..Self::default()
        }
    }

    /// Delay before the next scan, given how many scans in a row have
    /// failed so far. `None` means stop trying.
    pub fn delay_after(&self, failed_scans: u32) -> Option<Duration> {
        match self.max_scans {
            Some(max) if failed_scans >= max => None,
            _ => Some(self.scan_cooldown),
        }
    }
}

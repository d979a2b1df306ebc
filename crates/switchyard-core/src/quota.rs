//! Read-only view of the quota tracker.
//!
//! The tracker itself (and its persistence) lives outside the core. Routing
//! and adaptive concurrency only ever read through [`QuotaView`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Usage of one quota key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    /// Units consumed in the current window
    pub used: u64,

    /// Window limit; `None` means unmetered
    #[serde(default)]
    pub limit: Option<u64>,
}

impl QuotaStatus {
    pub fn new(used: u64, limit: Option<u64>) -> Self {
        Self { used, limit }
    }

    /// Remaining units, `None` when unmetered.
    pub fn remaining(&self) -> Option<u64> {
        self.limit.map(|l| l.saturating_sub(self.used))
    }

    /// Fraction of the limit consumed, `None` when unmetered.
    pub fn utilization(&self) -> Option<f64> {
        match self.limit {
            Some(0) => Some(1.0),
            Some(l) => Some(self.used as f64 / l as f64),
            None => None,
        }
    }

    /// Whether at least one more unit may be used.
    pub fn available(&self) -> bool {
        self.remaining().map_or(true, |r| r > 0)
    }
}

/// Quota collaborator interface.
pub trait QuotaView: Send + Sync {
    /// Whether `quota_key` still has capacity. Unknown keys are usable.
    fn can_use(&self, quota_key: &str) -> bool;

    /// Per-key usage, ordered by key.
    fn status(&self) -> BTreeMap<String, QuotaStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmetered_is_available() {
        let status = QuotaStatus::new(1_000_000, None);
        assert!(status.available());
        assert_eq!(status.remaining(), None);
        assert_eq!(status.utilization(), None);
    }

    #[test]
    fn test_exhausted() {
        let status = QuotaStatus::new(100, Some(100));
        assert!(!status.available());
        assert_eq!(status.remaining(), Some(0));
        assert_eq!(status.utilization(), Some(1.0));
    }

    #[test]
    fn test_zero_limit_counts_as_full() {
        let status = QuotaStatus::new(0, Some(0));
        assert_eq!(status.utilization(), Some(1.0));
        assert!(!status.available());
    }
}

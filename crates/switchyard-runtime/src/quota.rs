//! In-memory quota tracker.
//!
//! Seeded once from configuration. The router only ever reads it through
//! [`QuotaView`].

use parking_lot::RwLock;
use std::collections::BTreeMap;

use switchyard_core::{QuotaStatus, QuotaView};

/// Usage and limits per quota key.
#[derive(Debug, Default)]
pub struct QuotaTracker {
    entries: RwLock<BTreeMap<String, QuotaStatus>>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker seeded with `(key, used, limit)` rows.
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, u64, Option<u64>)>,
        K: Into<String>,
    {
        let tracker = Self::new();
        {
            let mut map = tracker.entries.write();
            for (key, used, limit) in entries {
                map.insert(key.into(), QuotaStatus::new(used, limit));
            }
        }
        tracker
    }
}

impl QuotaView for QuotaTracker {
    fn can_use(&self, key: &str) -> bool {
        self.entries
            .read()
            .get(key)
            .map(|s| s.available())
            .unwrap_or(true)
    }

    fn status(&self) -> BTreeMap<String, QuotaStatus> {
        self.entries.read().clone()
    }
}

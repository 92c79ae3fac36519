use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

/// Two staleness classes: lead pages turn over quickly, automation
/// settings barely change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtlClass {
    LeadList,
    Automation,
}

#[derive(Clone, Copy, Debug)]
pub struct CacheConfig {
    pub lead_list_ttl: Duration,
    pub automation_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lead_list_ttl: Duration::from_secs(30),
            automation_ttl: Duration::from_secs(300),
        }
    }
}

struct Slot {
    stored: Instant,
    ttl: Duration,
    value: serde_json::Value,
}

/// Process-local read cache keyed by canonical query strings. Entries
/// expire by TTL only; writes do not invalidate, so readers may observe
/// a page up to one TTL stale. Expired slots are dropped lazily on the
/// next lookup.
pub struct QueryCache {
    config: CacheConfig,
    slots: DashMap<String, Slot>,
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            slots: DashMap::new(),
        }
    }

    fn ttl_for(&self, class: TtlClass) -> Duration {
        match class {
            TtlClass::LeadList => self.config.lead_list_ttl,
            TtlClass::Automation => self.config.automation_ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let hit = match self.slots.get(key) {
            Some(slot) if slot.stored.elapsed() < slot.ttl => Some(slot.value.clone()),
            Some(_) => None,
            None => return None,
        };
        if hit.is_none() {
            self.slots.remove(key);
            debug!(key, "cache entry expired");
        }
        hit
    }

    pub fn put(&self, key: String, class: TtlClass, value: serde_json::Value) {
        self.slots.insert(
            key,
            Slot {
                stored: Instant::now(),
                ttl: self.ttl_for(class),
                value,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every expired slot. Called opportunistically from the query
    /// path so an idle cache does not accumulate dead pages.
    pub fn sweep(&self) {
        self.slots.retain(|_, slot| slot.stored.elapsed() < slot.ttl);
    }
}

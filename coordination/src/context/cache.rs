//! Tenant-scoped TTL cache for assembled context bundles (spec §4.4 step 7).
//!
//! Grounded in the teacher's `memory::store` in-process store shape, swapped
//! from a persistence-oriented store to a bounded LRU+TTL cache keyed by
//! `(tenant_id, query_hash)` with a prefix-style `invalidate_tenant`, matching
//! the "keyed LRU+TTL with periodic cleanup... bounded size" policy spec.md
//! §4.4 calls for.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::ContextItem;

/// Default entry-count bound when a caller doesn't ask for a tighter one.
const DEFAULT_MAX_ENTRIES: usize = 1024;

/// Run an eager expired-entry sweep every this many `put` calls, so TTL'd
/// entries that are never read again don't linger until eviction catches up.
const SWEEP_INTERVAL: u64 = 32;

struct Entry {
    items: Vec<ContextItem>,
    inserted_at: Instant,
    last_used: u64,
}

struct State {
    entries: HashMap<String, Entry>,
    clock: u64,
    puts_since_sweep: u64,
}

pub struct ContextCache {
    ttl: Duration,
    max_entries: usize,
    state: Mutex<State>,
}

fn full_key(tenant_id: &str, key: &str) -> String {
    format!("{tenant_id}:{key}")
}

impl ContextCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self::with_capacity(ttl_secs, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(ttl_secs: u64, max_entries: usize) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs),
            max_entries,
            state: Mutex::new(State {
                entries: HashMap::new(),
                clock: 0,
                puts_since_sweep: 0,
            }),
        }
    }

    pub fn get(&self, tenant_id: &str, key: &str) -> Option<Vec<ContextItem>> {
        let mut state = self.state.lock().expect("context cache lock poisoned");
        let full = full_key(tenant_id, key);
        let ttl = self.ttl;
        let expired = matches!(state.entries.get(&full), Some(e) if e.inserted_at.elapsed() >= ttl);
        if expired {
            state.entries.remove(&full);
            return None;
        }
        state.clock += 1;
        let clock = state.clock;
        let entry = state.entries.get_mut(&full)?;
        entry.last_used = clock;
        Some(entry.items.clone())
    }

    pub fn put(&self, tenant_id: &str, key: String, items: Vec<ContextItem>) {
        let mut state = self.state.lock().expect("context cache lock poisoned");
        state.clock += 1;
        let clock = state.clock;
        state.entries.insert(
            full_key(tenant_id, &key),
            Entry {
                items,
                inserted_at: Instant::now(),
                last_used: clock,
            },
        );

        state.puts_since_sweep += 1;
        if state.puts_since_sweep >= SWEEP_INTERVAL {
            state.puts_since_sweep = 0;
            let ttl = self.ttl;
            state.entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
        }

        let max_entries = self.max_entries;
        while state.entries.len() > max_entries {
            let lru_key = state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            match lru_key {
                Some(k) => {
                    state.entries.remove(&k);
                }
                None => break,
            }
        }
    }

    /// Remove every entry belonging to `tenant_id` (I1: tenant isolation
    /// extends to cache invalidation as well as retrieval).
    pub fn invalidate_tenant(&self, tenant_id: &str) {
        let prefix = format!("{tenant_id}:");
        let mut state = self.state.lock().expect("context cache lock poisoned");
        state.entries.retain(|k, _| !k.starts_with(&prefix));
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("context cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextItemType;

    fn item() -> ContextItem {
        ContextItem {
            kind: ContextItemType::Lesson,
            content: "x".to_string(),
            relevance: 0.9,
            tokens: 1,
            source_path: None,
            truncated: false,
        }
    }

    #[test]
    fn put_then_get_hits() {
        let cache = ContextCache::new(300);
        cache.put("tenant-a", "k1".to_string(), vec![item()]);
        assert!(cache.get("tenant-a", "k1").is_some());
    }

    #[test]
    fn different_tenant_does_not_see_entry() {
        let cache = ContextCache::new(300);
        cache.put("tenant-a", "k1".to_string(), vec![item()]);
        assert!(cache.get("tenant-b", "k1").is_none());
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache = ContextCache::new(0);
        cache.put("tenant-a", "k1".to_string(), vec![item()]);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(cache.get("tenant-a", "k1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_tenant_clears_only_that_tenant() {
        let cache = ContextCache::new(300);
        cache.put("tenant-a", "k1".to_string(), vec![item()]);
        cache.put("tenant-b", "k1".to_string(), vec![item()]);
        cache.invalidate_tenant("tenant-a");
        assert!(cache.get("tenant-a", "k1").is_none());
        assert!(cache.get("tenant-b", "k1").is_some());
    }

    #[test]
    fn put_beyond_capacity_evicts_least_recently_used() {
        let cache = ContextCache::with_capacity(300, 2);
        cache.put("tenant-a", "k1".to_string(), vec![item()]);
        cache.put("tenant-a", "k2".to_string(), vec![item()]);
        // touch k1 so it is more recently used than k2
        assert!(cache.get("tenant-a", "k1").is_some());
        cache.put("tenant-a", "k3".to_string(), vec![item()]);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("tenant-a", "k2").is_none());
        assert!(cache.get("tenant-a", "k1").is_some());
        assert!(cache.get("tenant-a", "k3").is_some());
    }

    #[test]
    fn periodic_sweep_evicts_expired_entries_without_a_read() {
        let cache = ContextCache::new(0);
        for i in 0..SWEEP_INTERVAL {
            cache.put("tenant-a", format!("k{i}"), vec![item()]);
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
        // the SWEEP_INTERVAL-th put triggers the sweep; nothing survives TTL=0
        cache.put("tenant-a", "trigger".to_string(), vec![item()]);
        assert!(cache.len() <= 1);
    }
}

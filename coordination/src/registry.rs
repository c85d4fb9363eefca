//! Provider health registry: ambient observability over the pluggable
//! [`crate::collaborators::CompletionProvider`] (spec's Non-goals exclude
//! the transport itself, not watching how it behaves).
//!
//! Grounded in the teacher's `registry::ProviderHealth` (rolling
//! success/error counters, running average latency, availability flag),
//! narrowed here to the one collaborator this core actually calls.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Rolling health for a single provider identifier
/// ([`crate::collaborators::CompletionProvider::provider_id`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub available: bool,
    pub avg_latency_ms: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub status_message: Option<String>,
}

impl ProviderHealth {
    pub fn healthy() -> Self {
        Self {
            available: true,
            avg_latency_ms: 0,
            success_count: 0,
            error_count: 0,
            status_message: None,
        }
    }

    pub fn success_rate(&self) -> f32 {
        let total = self.success_count + self.error_count;
        if total == 0 {
            1.0
        } else {
            self.success_count as f32 / total as f32
        }
    }

    fn record_success(&mut self, latency_ms: u64) {
        self.avg_latency_ms = (self.avg_latency_ms * self.success_count + latency_ms) / (self.success_count + 1);
        self.success_count += 1;
        self.available = true;
        self.status_message = None;
    }

    fn record_failure(&mut self, reason: impl Into<String>) {
        self.error_count += 1;
        self.status_message = Some(reason.into());
        if self.success_rate() < 0.5 {
            self.available = false;
        }
    }
}

/// Sealed-enough registry (no removal, only observation) of provider health
/// keyed by provider ID. Shared across concurrent dispatches via an internal
/// mutex; cheap to clone a snapshot out for logging.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Mutex<HashMap<String, ProviderHealth>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, provider_id: &str, latency_ms: u64) {
        let mut providers = self.providers.lock().expect("provider registry lock poisoned");
        providers
            .entry(provider_id.to_string())
            .or_insert_with(ProviderHealth::healthy)
            .record_success(latency_ms);
    }

    pub fn record_failure(&self, provider_id: &str, reason: &str) {
        let mut providers = self.providers.lock().expect("provider registry lock poisoned");
        providers
            .entry(provider_id.to_string())
            .or_insert_with(ProviderHealth::healthy)
            .record_failure(reason.to_string());
    }

    pub fn snapshot(&self, provider_id: &str) -> Option<ProviderHealth> {
        self.providers
            .lock()
            .expect("provider registry lock poisoned")
            .get(provider_id)
            .cloned()
    }
}

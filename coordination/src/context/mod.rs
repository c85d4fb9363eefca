//! Context Manager (spec §4.4).
//!
//! Assembles a token-bounded context bundle from lessons/code/history
//! sources, cached by a stable hash of the query. Grounded in the teacher's
//! `context_packer::packer::ContextPacker` (pack-within-budget / truncation
//! logic) and `memory::budget::TokenBudget` (reserve/spend accounting), with
//! retrieval itself generalised from the teacher's single memory store to
//! the spec's three pluggable sources.

mod cache;
mod retrieval;

pub use cache::ContextCache;
pub use retrieval::{pack_context, rank_items};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collaborators::{EmbeddingProvider, HistoryProvider, VectorFilter, VectorStore};
use crate::config::AgentContextBudget;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("tenant_id is required for context retrieval")]
    MissingTenant,
    #[error("vector store error: {0}")]
    VectorStore(String),
    #[error("history provider error: {0}")]
    History(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextItemType {
    Lesson,
    Code,
    History,
}

/// A single retrieved, token-estimated unit of context (spec §3 `ContextItem`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextItem {
    #[serde(rename = "type")]
    pub kind: ContextItemType,
    pub content: String,
    pub relevance: f32,
    pub tokens: u32,
    /// Present for `code` items; used for file-path dedup (spec §4.4 step 4).
    pub source_path: Option<String>,
    pub truncated: bool,
}

/// Inclusion toggles for a retrieval call.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncludeSources {
    pub lessons: bool,
    pub code: bool,
    pub history: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalFilters {
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

/// A context retrieval request (spec §4.4 inputs).
#[derive(Debug, Clone)]
pub struct ContextQuery {
    pub query: String,
    pub task_id: Option<String>,
    pub project_id: Option<String>,
    pub agent_type: String,
    pub tenant_id: String,
    pub token_budget: Option<u32>,
    pub include: IncludeSources,
    pub filters: RetrievalFilters,
}

/// Result of a context assembly call.
#[derive(Debug, Clone)]
pub struct ContextBundle {
    pub items: Vec<ContextItem>,
    pub cache_hit: bool,
}

/// Approximate token estimate: `ceil(len(content)/4)` (spec §4.4).
pub fn estimate_tokens(content: &str) -> u32 {
    let len = content.chars().count();
    len.div_ceil(4) as u32
}

/// Stable hash of the parameters that determine a retrieval's result,
/// used as the context cache key (spec §4.4 step 1).
fn cache_key(query: &ContextQuery) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(query.tenant_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(query.query.as_bytes());
    hasher.update(b"\0");
    hasher.update(query.agent_type.as_bytes());
    hasher.update(b"\0");
    hasher.update(query.project_id.as_deref().unwrap_or("").as_bytes());
    hasher.update(b"\0");
    hasher.update(query.task_id.as_deref().unwrap_or("").as_bytes());
    hasher.update(b"\0");
    hasher.update(&[
        query.include.lessons as u8,
        query.include.code as u8,
        query.include.history as u8,
    ]);
    hasher.finalize().to_hex().to_string()
}

/// Assembles per-agent context bundles from lessons/code/history sources
/// behind a tenant-scoped TTL cache (I1).
pub struct ContextManager {
    vector_store: Option<Arc<dyn VectorStore>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    history_provider: Option<Arc<dyn HistoryProvider>>,
    cache: ContextCache,
    reserved_system_tokens: u32,
}

impl ContextManager {
    pub fn new(
        vector_store: Option<Arc<dyn VectorStore>>,
        embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
        history_provider: Option<Arc<dyn HistoryProvider>>,
        cache_ttl_secs: u64,
        reserved_system_tokens: u32,
    ) -> Self {
        Self {
            vector_store,
            embedding_provider,
            history_provider,
            cache: ContextCache::new(cache_ttl_secs),
            reserved_system_tokens,
        }
    }

    pub fn invalidate_tenant(&self, tenant_id: &str) {
        self.cache.invalidate_tenant(tenant_id);
    }

    /// Run the full retrieval procedure (spec §4.4 steps 1-7).
    pub async fn retrieve(
        &self,
        query: ContextQuery,
        budget: &AgentContextBudget,
    ) -> Result<ContextBundle, ContextError> {
        if query.tenant_id.trim().is_empty() {
            return Err(ContextError::MissingTenant);
        }

        let key = cache_key(&query);
        if let Some(items) = self.cache.get(&query.tenant_id, &key) {
            return Ok(ContextBundle {
                items,
                cache_hit: true,
            });
        }

        // Step 2: effective sources.
        let effective = IncludeSources {
            lessons: query.include.lessons,
            code: query.include.code && query.project_id.is_some(),
            history: query.include.history && self.history_provider.is_some(),
        };

        // Step 3: renormalise allocation over active sources.
        let available = budget.total_tokens.saturating_sub(self.reserved_system_tokens);
        let shares = retrieval::normalise_allocation(&budget.allocation, &effective);

        let lessons_budget = (available as f32 * shares.lessons) as u32;
        let code_budget = (available as f32 * shares.code) as u32;
        let history_budget = (available as f32 * shares.history) as u32;

        let embedding = if effective.lessons || effective.code {
            match self.embedding_provider.as_ref() {
                Some(provider) => Some(
                    provider
                        .embed(&query.query)
                        .await
                        .map_err(|e| ContextError::VectorStore(e.to_string()))?,
                ),
                None => None,
            }
        } else {
            None
        };

        // Step 4: concurrent retrieval per active source.
        let lessons_fut = retrieval::retrieve_lessons(
            self.vector_store.as_deref(),
            embedding.as_ref(),
            &query,
            lessons_budget,
            effective.lessons,
        );
        let code_fut = retrieval::retrieve_code(
            self.vector_store.as_deref(),
            embedding.as_ref(),
            &query,
            code_budget,
            effective.code,
        );
        let history_fut = retrieval::retrieve_history(
            self.history_provider.as_deref(),
            &query,
            history_budget,
            effective.history,
        );

        let (lessons, code, history) = tokio::try_join!(lessons_fut, code_fut, history_fut)?;

        let mut all_items = Vec::new();
        all_items.extend(lessons);
        all_items.extend(code);
        all_items.extend(history);

        // Step 5: rank by relevance.
        let ranked = rank_items(all_items, &query.agent_type);

        // Step 6: pack within budget, truncating the first item that doesn't fit.
        let packed = pack_context(ranked, available);

        self.cache.put(&query.tenant_id, key, packed.clone());

        Ok(ContextBundle {
            items: packed,
            cache_hit: false,
        })
    }
}

pub(crate) fn vector_filter(query: &ContextQuery, categories: Vec<String>) -> VectorFilter {
    VectorFilter {
        tenant_id: query.tenant_id.clone(),
        project_id: query.project_id.clone(),
        categories,
        tags: query.filters.tags.clone(),
    }
}

pub(crate) fn metadata_string(meta: &HashMap<String, serde_json::Value>, key: &str) -> Option<String> {
    meta.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_depends_on_tenant() {
        let mut q1 = base_query();
        q1.tenant_id = "tenant-a".to_string();
        let mut q2 = base_query();
        q2.tenant_id = "tenant-b".to_string();
        assert_ne!(cache_key(&q1), cache_key(&q2));
    }

    #[test]
    fn cache_key_is_stable_for_identical_query() {
        let q1 = base_query();
        let q2 = base_query();
        assert_eq!(cache_key(&q1), cache_key(&q2));
    }

    fn base_query() -> ContextQuery {
        ContextQuery {
            query: "how do I add auth".to_string(),
            task_id: None,
            project_id: Some("proj-1".to_string()),
            agent_type: "architect".to_string(),
            tenant_id: "tenant-a".to_string(),
            token_budget: None,
            include: IncludeSources {
                lessons: true,
                code: true,
                history: false,
            },
            filters: RetrievalFilters::default(),
        }
    }
}

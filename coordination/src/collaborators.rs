//! Collaborator contracts the core consumes (spec §6).
//!
//! The LLM transport, vector store, embedding model, and history provider are
//! deliberately out of scope (spec §1) — they are pluggable capabilities the
//! kernel is generic over. Concrete implementations (a real HTTP-backed LLM
//! client, a real vector database) live outside this crate; `crates/agents`
//! supplies in-memory fakes for tests and demonstration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::CoreResult;

/// Token usage reported by a single completion call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// One message in a completion request, role-tagged like a chat transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Free-form metadata threaded through to the provider (model hints, routing
/// tags) and returned unchanged — the kernel never interprets it.
pub type CompletionMetadata = HashMap<String, serde_json::Value>;

/// `CompletionProvider.Complete(system, messages, metadata) -> (text, usage)`.
///
/// Implementations must be cancel-safe: callers may drop the future
/// (e.g. on session cancellation) without leaking provider-side resources.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        metadata: &CompletionMetadata,
    ) -> CoreResult<(String, Usage)>;

    /// Stable identifier used for provider-health logging (not part of the
    /// wire contract, purely observability — see `SPEC_FULL.md` §3).
    fn provider_id(&self) -> &str {
        "unknown"
    }
}

/// A single embedding vector.
pub type Embedding = Vec<f32>;

/// `EmbeddingProvider.Embed(text) -> vector`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> CoreResult<Embedding>;
}

/// A vector-store search filter. `tenant_id` is mandatory on every query —
/// enforcement of I1 (tenant isolation) happens at the call site in
/// `context::manager`, but the field exists here so implementations can also
/// defend in depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorFilter {
    pub tenant_id: String,
    pub project_id: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
}

/// One hit from a vector-store search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub content: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A point to upsert into the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: String,
    pub embedding: Embedding,
    pub content: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// `VectorStore.Search/Upsert/Delete`. Every call is tenant-scoped (I1).
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(
        &self,
        collection: &str,
        embedding: &Embedding,
        filter: &VectorFilter,
        limit: usize,
        score_threshold: f32,
    ) -> CoreResult<Vec<VectorHit>>;

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> CoreResult<()>;

    async fn delete(&self, collection: &str, filter: &VectorFilter) -> CoreResult<()>;
}

/// A single item of retrieved conversational/task history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    pub content: String,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
    pub relevance: f32,
}

/// `HistoryProvider.Retrieve(query, tenantId, taskId, timeRange, limit)` —
/// optional collaborator (spec §6): the context manager only queries
/// `history` sources when one is configured.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn retrieve(
        &self,
        query: &str,
        tenant_id: &str,
        task_id: Option<&str>,
        time_range: Option<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)>,
        limit: usize,
    ) -> CoreResult<Vec<HistoryItem>>;
}

//! In-memory fake collaborators so the kernel can be exercised end-to-end
//! without a real LLM, vector database, or history store (spec.md §1
//! explicitly keeps those out of the core's scope).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use coordination::collaborators::{
    CompletionMetadata, CompletionProvider, Embedding, EmbeddingProvider, HistoryItem,
    HistoryProvider, Message, Usage, VectorFilter, VectorHit, VectorPoint, VectorStore,
};
use coordination::error::CoreResult;

/// Scripted completion provider: returns queued responses in order, falling
/// back to a fixed default once exhausted. Used by the CLI demo and
/// integration tests in place of a real model.
pub struct ScriptedCompletionProvider {
    queue: Mutex<Vec<String>>,
    default_response: String,
}

impl ScriptedCompletionProvider {
    pub fn new(responses: Vec<String>, default_response: impl Into<String>) -> Self {
        Self {
            queue: Mutex::new(responses),
            default_response: default_response.into(),
        }
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletionProvider {
    async fn complete(
        &self,
        _system: &str,
        _messages: &[Message],
        _metadata: &CompletionMetadata,
    ) -> CoreResult<(String, Usage)> {
        let mut queue = self.queue.lock().expect("scripted provider lock poisoned");
        let text = if queue.is_empty() {
            self.default_response.clone()
        } else {
            queue.remove(0)
        };
        let output_tokens = (text.len() / 4) as u32;
        Ok((text, Usage {
            input_tokens: 50,
            output_tokens,
        }))
    }

    fn provider_id(&self) -> &str {
        "fake-completion-provider"
    }
}

/// In-memory vector store, keyed by collection name. Similarity is
/// approximated by cosine distance over the stored embeddings so ranking
/// behaves realistically in tests without a real index.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: Mutex<HashMap<String, Vec<VectorPoint>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, collection: &str, points: Vec<VectorPoint>) {
        self.collections
            .lock()
            .expect("vector store lock poisoned")
            .entry(collection.to_string())
            .or_default()
            .extend(points);
    }
}

fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search(
        &self,
        collection: &str,
        embedding: &Embedding,
        filter: &VectorFilter,
        limit: usize,
        score_threshold: f32,
    ) -> CoreResult<Vec<VectorHit>> {
        let collections = self.collections.lock().expect("vector store lock poisoned");
        let Some(points) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<VectorHit> = points
            .iter()
            .filter(|p| {
                p.metadata.get("tenant_id").and_then(|v| v.as_str()) == Some(filter.tenant_id.as_str())
            })
            .filter(|p| {
                filter.project_id.is_none()
                    || p.metadata.get("project_id").and_then(|v| v.as_str()) == filter.project_id.as_deref()
            })
            .filter(|p| {
                filter.categories.is_empty()
                    || p.metadata
                        .get("category")
                        .and_then(|v| v.as_str())
                        .map(|c| filter.categories.iter().any(|fc| fc == c))
                        .unwrap_or(false)
            })
            .map(|p| VectorHit {
                id: p.id.clone(),
                score: cosine_similarity(embedding, &p.embedding),
                content: p.content.clone(),
                metadata: p.metadata.clone(),
            })
            .filter(|hit| hit.score >= score_threshold)
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> CoreResult<()> {
        self.collections
            .lock()
            .expect("vector store lock poisoned")
            .entry(collection.to_string())
            .or_default()
            .extend(points);
        Ok(())
    }

    async fn delete(&self, collection: &str, filter: &VectorFilter) -> CoreResult<()> {
        if let Some(points) = self.collections.lock().expect("vector store lock poisoned").get_mut(collection) {
            points.retain(|p| {
                p.metadata.get("tenant_id").and_then(|v| v.as_str()) != Some(filter.tenant_id.as_str())
            });
        }
        Ok(())
    }
}

/// Deterministic embedding provider: hashes the text into a fixed-length
/// vector so identical inputs always embed identically, without depending
/// on a real embedding model.
pub struct HashingEmbeddingProvider {
    dims: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> CoreResult<Embedding> {
        let hash = blake3::hash(text.as_bytes());
        let bytes = hash.as_bytes();
        let mut vector = Vec::with_capacity(self.dims);
        for i in 0..self.dims {
            let byte = bytes[i % bytes.len()];
            vector.push((byte as f32 / 255.0) * 2.0 - 1.0);
        }
        Ok(vector)
    }
}

/// In-memory session history, filtered by tenant and optional task.
#[derive(Default)]
pub struct InMemoryHistoryProvider {
    items: Mutex<Vec<(String, HistoryItem)>>,
}

impl InMemoryHistoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, tenant_id: &str, item: HistoryItem) {
        self.items
            .lock()
            .expect("history provider lock poisoned")
            .push((tenant_id.to_string(), item));
    }
}

#[async_trait]
impl HistoryProvider for InMemoryHistoryProvider {
    async fn retrieve(
        &self,
        _query: &str,
        tenant_id: &str,
        _task_id: Option<&str>,
        time_range: Option<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)>,
        limit: usize,
    ) -> CoreResult<Vec<HistoryItem>> {
        let items = self.items.lock().expect("history provider lock poisoned");
        let mut matched: Vec<HistoryItem> = items
            .iter()
            .filter(|(t, _)| t == tenant_id)
            .filter(|(_, item)| {
                time_range
                    .map(|(start, end)| item.occurred_at >= start && item.occurred_at <= end)
                    .unwrap_or(true)
            })
            .map(|(_, item)| item.clone())
            .collect();
        matched.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal));
        matched.truncate(limit);
        Ok(matched)
    }
}

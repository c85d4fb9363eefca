//! Per-source retrieval, ranking, and budget-aware packing (spec §4.4
//! steps 3-6). Grounded in the teacher's `context_packer::packer` pack/
//! truncate logic, generalised to rank across three distinct sources
//! instead of one memory store.

use std::collections::HashMap;

use crate::collaborators::{Embedding, HistoryProvider, VectorStore};
use crate::config::SourceAllocation;

use super::{estimate_tokens, metadata_string, vector_filter, ContextError, ContextItem, ContextItemType, ContextQuery, IncludeSources};

const LESSON_SCORE_THRESHOLD: f32 = 0.6;
const CODE_SCORE_THRESHOLD: f32 = 0.5;
const LESSONS_COLLECTION: &str = "lessons";
const CODE_COLLECTION: &str = "code";
const MIN_TRUNCATION_REMAINDER: u32 = 50;
const TRUNCATION_MARKER: &str = "\n...[truncated]";

/// Renormalise `allocation` over the set of `active` sources so the shares
/// used sum to 1.0 (spec §4.4 step 3). Inactive sources get 0.
pub fn normalise_allocation(allocation: &SourceAllocation, active: &IncludeSources) -> SourceAllocation {
    let lessons = if active.lessons { allocation.lessons } else { 0.0 };
    let code = if active.code { allocation.code } else { 0.0 };
    let history = if active.history { allocation.history } else { 0.0 };
    let total = lessons + code + history;
    if total <= 0.0 {
        return SourceAllocation {
            lessons: 0.0,
            code: 0.0,
            history: 0.0,
        };
    }
    SourceAllocation {
        lessons: lessons / total,
        code: code / total,
        history: history / total,
    }
}

fn limit_from_budget(budget_tokens: u32) -> usize {
    // A generous per-source fetch cap; ranking/packing trims to budget.
    (budget_tokens / 20).clamp(5, 50) as usize
}

pub async fn retrieve_lessons(
    store: Option<&dyn VectorStore>,
    embedding: Option<&Embedding>,
    query: &ContextQuery,
    budget_tokens: u32,
    active: bool,
) -> Result<Vec<ContextItem>, ContextError> {
    if !active {
        return Ok(Vec::new());
    }
    let (Some(store), Some(embedding)) = (store, embedding) else {
        return Ok(Vec::new());
    };
    let filter = vector_filter(query, query.filters.categories.clone());
    let hits = store
        .search(
            LESSONS_COLLECTION,
            embedding,
            &filter,
            limit_from_budget(budget_tokens),
            LESSON_SCORE_THRESHOLD,
        )
        .await
        .map_err(|e| ContextError::VectorStore(e.to_string()))?;

    Ok(hits
        .into_iter()
        .map(|hit| {
            let tokens = estimate_tokens(&hit.content);
            ContextItem {
                kind: ContextItemType::Lesson,
                content: hit.content,
                relevance: hit.score,
                tokens,
                source_path: None,
                truncated: false,
            }
        })
        .collect())
}

pub async fn retrieve_code(
    store: Option<&dyn VectorStore>,
    embedding: Option<&Embedding>,
    query: &ContextQuery,
    budget_tokens: u32,
    active: bool,
) -> Result<Vec<ContextItem>, ContextError> {
    if !active {
        return Ok(Vec::new());
    }
    let (Some(store), Some(embedding)) = (store, embedding) else {
        return Ok(Vec::new());
    };
    let filter = vector_filter(query, query.filters.categories.clone());
    let hits = store
        .search(
            CODE_COLLECTION,
            embedding,
            &filter,
            limit_from_budget(budget_tokens),
            CODE_SCORE_THRESHOLD,
        )
        .await
        .map_err(|e| ContextError::VectorStore(e.to_string()))?;

    // Deduplicate by file path, keeping the highest-scoring chunk per file
    // (spec §4.4 step 4).
    let mut best_by_path: HashMap<String, crate::collaborators::VectorHit> = HashMap::new();
    let mut unpathed = Vec::new();
    for hit in hits {
        match metadata_string(&hit.metadata, "path") {
            Some(path) => {
                let entry = best_by_path.entry(path).or_insert_with(|| hit.clone());
                if hit.score > entry.score {
                    *entry = hit;
                }
            }
            None => unpathed.push(hit),
        }
    }

    let mut items: Vec<ContextItem> = best_by_path
        .into_iter()
        .map(|(path, hit)| {
            let tokens = estimate_tokens(&hit.content);
            ContextItem {
                kind: ContextItemType::Code,
                content: hit.content,
                relevance: hit.score,
                tokens,
                source_path: Some(path),
                truncated: false,
            }
        })
        .collect();

    items.extend(unpathed.into_iter().map(|hit| {
        let tokens = estimate_tokens(&hit.content);
        ContextItem {
            kind: ContextItemType::Code,
            content: hit.content,
            relevance: hit.score,
            tokens,
            source_path: None,
            truncated: false,
        }
    }));

    Ok(items)
}

pub async fn retrieve_history(
    provider: Option<&dyn HistoryProvider>,
    query: &ContextQuery,
    budget_tokens: u32,
    active: bool,
) -> Result<Vec<ContextItem>, ContextError> {
    if !active {
        return Ok(Vec::new());
    }
    let Some(provider) = provider else {
        return Ok(Vec::new());
    };
    let items = provider
        .retrieve(
            &query.query,
            &query.tenant_id,
            query.task_id.as_deref(),
            query.filters.time_range,
            limit_from_budget(budget_tokens),
        )
        .await
        .map_err(|e| ContextError::History(e.to_string()))?;

    Ok(items
        .into_iter()
        .map(|item| {
            let tokens = estimate_tokens(&item.content);
            ContextItem {
                kind: ContextItemType::History,
                content: item.content,
                relevance: item.relevance,
                tokens,
                source_path: None,
                truncated: false,
            }
        })
        .collect())
}

/// Agent-affinity nudge: architects and project managers weight code/history
/// slightly higher, analysts weight lessons higher. A small bonus, never
/// enough to invert a strong raw-similarity gap.
fn affinity_bonus(item: &ContextItem, agent_type: &str) -> f32 {
    match (agent_type, item.kind) {
        ("architect", ContextItemType::Code) => 0.05,
        ("project_manager", ContextItemType::History) => 0.05,
        ("analyst", ContextItemType::Lesson) => 0.05,
        _ => 0.0,
    }
}

/// Rank the union of retrieved items by relevance plus a small agent-affinity
/// bonus (spec §4.4 step 5).
pub fn rank_items(mut items: Vec<ContextItem>, agent_type: &str) -> Vec<ContextItem> {
    items.sort_by(|a, b| {
        let score_a = a.relevance + affinity_bonus(a, agent_type);
        let score_b = b.relevance + affinity_bonus(b, agent_type);
        score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
    });
    items
}

/// Truncate `content` to fit within `remaining` tokens, cutting at the last
/// newline or period before the cutoff and appending a marker.
fn truncate_to_budget(content: &str, remaining_tokens: u32) -> String {
    let max_chars = (remaining_tokens as usize) * 4;
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let cut: String = content.chars().take(max_chars).collect();
    let boundary = cut.rfind(['\n', '.']).map(|i| i + 1).unwrap_or(cut.len());
    format!("{}{}", &cut[..boundary], TRUNCATION_MARKER)
}

/// Pack ranked items within `available` tokens (spec §4.4 step 6): include
/// items in ranked order while the running total fits; if at least
/// [`MIN_TRUNCATION_REMAINDER`] tokens remain but the next item doesn't fit,
/// emit a truncated variant of it and stop.
pub fn pack_context(ranked: Vec<ContextItem>, available: u32) -> Vec<ContextItem> {
    let mut used = 0u32;
    let mut packed = Vec::new();

    for item in ranked {
        let remaining = available.saturating_sub(used);
        if item.tokens <= remaining {
            used += item.tokens;
            packed.push(item);
            continue;
        }

        if remaining >= MIN_TRUNCATION_REMAINDER {
            let truncated_content = truncate_to_budget(&item.content, remaining);
            let tokens = estimate_tokens(&truncated_content);
            packed.push(ContextItem {
                content: truncated_content,
                tokens,
                truncated: true,
                ..item
            });
        }
        break;
    }

    packed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(kind: ContextItemType, relevance: f32, tokens: u32) -> ContextItem {
        ContextItem {
            kind,
            content: "x".repeat((tokens * 4) as usize),
            relevance,
            tokens,
            source_path: None,
            truncated: false,
        }
    }

    #[test]
    fn normalise_allocation_ignores_inactive_sources() {
        let allocation = SourceAllocation {
            lessons: 0.4,
            code: 0.4,
            history: 0.2,
        };
        let active = IncludeSources {
            lessons: true,
            code: true,
            history: false,
        };
        let out = normalise_allocation(&allocation, &active);
        assert!((out.lessons - 0.5).abs() < 1e-6);
        assert!((out.code - 0.5).abs() < 1e-6);
        assert_eq!(out.history, 0.0);
    }

    #[test]
    fn rank_items_sorts_by_relevance_descending() {
        let items = vec![
            item(ContextItemType::Lesson, 0.5, 10),
            item(ContextItemType::Lesson, 0.9, 10),
        ];
        let ranked = rank_items(items, "unknown");
        assert!(ranked[0].relevance > ranked[1].relevance);
    }

    #[test]
    fn pack_context_stops_at_budget() {
        let items = vec![item(ContextItemType::Lesson, 0.9, 50), item(ContextItemType::Lesson, 0.8, 50)];
        let packed = pack_context(items, 60);
        assert_eq!(packed.len(), 1);
    }

    #[test]
    fn pack_context_truncates_when_remainder_large_enough() {
        let items = vec![item(ContextItemType::Lesson, 0.9, 100)];
        let packed = pack_context(items, 60);
        assert_eq!(packed.len(), 1);
        assert!(packed[0].truncated);
        assert!(packed[0].content.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn pack_context_skips_when_remainder_too_small() {
        let items = vec![item(ContextItemType::Lesson, 0.9, 100), item(ContextItemType::Lesson, 0.8, 5)];
        let packed = pack_context(items, 10);
        assert!(packed.is_empty() || packed.len() == 1);
    }
}

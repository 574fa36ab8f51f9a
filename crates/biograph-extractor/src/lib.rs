//! Biograph Extractor - Schema-constrained extraction pipeline
//!
//! Resolves NER spans into per-document entity indexes, validates LLM
//! relation and personality output against the injected schema, and
//! evaluates the assembled artifacts against ground truth.

use once_cell::sync::Lazy;
use regex::Regex;

pub mod entity_index;
pub mod metrics;
pub mod ner;
pub mod personality;
pub mod pipeline;
pub mod relation;
pub mod retry;

pub use entity_index::{EntityIndex, ResolutionConflict};
pub use metrics::{Evaluator, MetricsReport, PersonalityScores, PrfScores, SetMetrics};
pub use ner::{GazetteerEntry, GazetteerNer, PrecomputedSpans};
pub use personality::{PersonalityPrompt, PersonalityReconciler, PersonalityWarning, Reconciled};
pub use pipeline::{
    Category, DocumentExtraction, DocumentExtractor, DocumentStatus, Pipeline, RunOutcome,
};
pub use relation::{parse_candidates, DiscardCounts, FilterOutcome, RelationFilter, RelationPrompt};
pub use retry::RetryPolicy;

static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// Pull a JSON value out of raw LLM text.
///
/// Tries the whole (fence-stripped) response first, then the outermost
/// `{...}` block, since models often wrap JSON in prose.
pub fn extract_json(raw: &str) -> Option<serde_json::Value> {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    if let Ok(value) = serde_json::from_str(unfenced) {
        return Some(value);
    }

    JSON_OBJECT
        .find(unfenced)
        .and_then(|m| serde_json::from_str(m.as_str()).ok())
}

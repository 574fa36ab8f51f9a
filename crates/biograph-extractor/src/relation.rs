//! Relation filtering
//!
//! Validates untrusted candidate triples from the relation LLM against the
//! fixed predicate schema, the document's entity index and the type
//! constraint table. Every candidate is accepted or rejected on its own;
//! nothing aborts a batch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use biograph_core::{
    BiographError, CandidateRelation, DiscardReason, Entity, Predicate, RelationKey, Result,
    SchemaConfig, ValidatedRelation,
};

use crate::EntityIndex;

// ============================================================================
// Filter
// ============================================================================

/// Number of discarded candidates per reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardCounts {
    pub schema_violation: usize,
    pub unresolved_reference: usize,
    pub type_constraint_violation: usize,
}

impl DiscardCounts {
    pub fn record(&mut self, reason: DiscardReason) {
        match reason {
            DiscardReason::SchemaViolation => self.schema_violation += 1,
            DiscardReason::UnresolvedReference => self.unresolved_reference += 1,
            DiscardReason::TypeConstraintViolation => self.type_constraint_violation += 1,
        }
    }

    pub fn get(&self, reason: DiscardReason) -> usize {
        match reason {
            DiscardReason::SchemaViolation => self.schema_violation,
            DiscardReason::UnresolvedReference => self.unresolved_reference,
            DiscardReason::TypeConstraintViolation => self.type_constraint_violation,
        }
    }

    pub fn total(&self) -> usize {
        self.schema_violation + self.unresolved_reference + self.type_constraint_violation
    }

    pub fn merge(&mut self, other: &DiscardCounts) {
        self.schema_violation += other.schema_violation;
        self.unresolved_reference += other.unresolved_reference;
        self.type_constraint_violation += other.type_constraint_violation;
    }
}

/// Result of filtering one document's candidates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterOutcome {
    /// Deduplicated relations in first-occurrence order
    pub relations: Vec<ValidatedRelation>,
    pub discarded: DiscardCounts,
    /// Valid candidates collapsed into an earlier identical triple
    pub duplicates: usize,
}

/// Schema-constrained relation filter
pub struct RelationFilter {
    schema: Arc<SchemaConfig>,
    predicates: HashMap<String, Predicate>,
}

impl RelationFilter {
    pub fn new(schema: Arc<SchemaConfig>) -> Self {
        let predicates = schema.predicate_lookup();
        Self { schema, predicates }
    }

    pub fn schema(&self) -> &SchemaConfig {
        &self.schema
    }

    /// Map a free-text predicate onto the fixed predicate set
    pub fn normalize_predicate(&self, raw: &str) -> Option<Predicate> {
        self.predicates
            .get(&SchemaConfig::normalize_predicate(raw))
            .copied()
    }

    fn resolve<'a>(&self, index: &'a EntityIndex, text: &str) -> Result<&'a Entity> {
        if self.schema.is_pronoun(text) {
            return Err(BiographError::UnresolvedReference(format!(
                "{text} (pronoun)"
            )));
        }
        index
            .lookup(text)
            .ok_or_else(|| BiographError::UnresolvedReference(text.to_string()))
    }

    /// Validate a single candidate against the schema and entity index
    pub fn validate(
        &self,
        index: &EntityIndex,
        candidate: &CandidateRelation,
    ) -> Result<ValidatedRelation> {
        let predicate = self
            .normalize_predicate(&candidate.predicate_raw)
            .ok_or_else(|| BiographError::SchemaViolation(candidate.predicate_raw.clone()))?;

        if candidate.source_doc_id != index.doc_id() {
            return Err(BiographError::UnresolvedReference(format!(
                "candidate from {} resolved against {}",
                candidate.source_doc_id,
                index.doc_id()
            )));
        }

        let subject = self.resolve(index, &candidate.subject_text)?;
        let object = self.resolve(index, &candidate.object_text)?;

        // No predicate relates an entity to itself
        let self_reference = subject.id == object.id;
        if self_reference
            || !self
                .schema
                .allows(predicate, &subject.entity_type, &object.entity_type)
        {
            return Err(BiographError::TypeConstraintViolation {
                predicate,
                subject_type: subject.entity_type.clone(),
                object_type: object.entity_type.clone(),
            });
        }

        Ok(ValidatedRelation {
            subject_id: subject.id.clone(),
            predicate,
            object_id: object.id.clone(),
            source_doc_id: candidate.source_doc_id.clone(),
        })
    }

    /// Filter and deduplicate a batch of candidates for one document
    pub fn filter(&self, index: &EntityIndex, candidates: &[CandidateRelation]) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();
        let mut seen: HashSet<RelationKey> = HashSet::new();

        for candidate in candidates {
            match self.validate(index, candidate) {
                Ok(relation) => {
                    if seen.insert(relation.key()) {
                        outcome.relations.push(relation);
                    } else {
                        outcome.duplicates += 1;
                    }
                }
                Err(err) => {
                    debug!(
                        doc_id = %index.doc_id(),
                        subject = %candidate.subject_text,
                        predicate = %candidate.predicate_raw,
                        object = %candidate.object_text,
                        error = %err,
                        "discarding candidate relation"
                    );
                    if let Some(reason) = err.discard_reason() {
                        outcome.discarded.record(reason);
                    }
                }
            }
        }

        outcome
    }
}

// ============================================================================
// LLM output parsing
// ============================================================================

/// Turn relation LLM JSON into candidates.
///
/// Accepts `{"relations": [...]}` or a bare array. Any other shape is an
/// `Llm` error so the call is retried. Entries that are not objects with
/// string `subject`/`predicate`/`object` fields are skipped.
pub fn parse_candidates(doc_id: &str, value: &Value) -> Result<Vec<CandidateRelation>> {
    let items: &[Value] = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("relations") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => {
                return Err(BiographError::Llm(format!(
                    "relation output has no relations array: {value}"
                )))
            }
        },
        _ => {
            return Err(BiographError::Llm(format!(
                "relation output is not a list of relations: {value}"
            )))
        }
    };

    Ok(items
        .iter()
        .filter_map(|item| {
            let field = |name: &str| -> Option<String> { item.get(name)?.as_str().map(str::to_string) };
            match (field("subject"), field("predicate"), field("object")) {
                (Some(s), Some(p), Some(o)) => Some(CandidateRelation::new(s, p, o, doc_id)),
                _ => {
                    debug!(doc_id, item = %item, "skipping malformed relation entry");
                    None
                }
            }
        })
        .collect())
}

// ============================================================================
// Prompt
// ============================================================================

/// Builds the schema-constrained relation extraction prompt
pub struct RelationPrompt {
    schema: Arc<SchemaConfig>,
}

impl RelationPrompt {
    pub fn new(schema: Arc<SchemaConfig>) -> Self {
        Self { schema }
    }

    pub fn build(&self, text: &str, entities: &[Entity]) -> String {
        let predicates: Vec<&str> = Predicate::ALL.iter().map(|p| p.as_str()).collect();
        let constraints = self.schema.describe_constraints();
        let entity_names: Vec<&str> = entities.iter().map(|e| e.surface_text.as_str()).collect();

        format!(
            r#"You are an information extraction assistant.

Extract only factual relationships that fit this schema. Do not infer beyond the text.

ALLOWED PREDICATES (use EXACT spelling):
- {predicates}

RULES:
- Use ONLY the predicates above.
- Subject and object MUST be copied EXACTLY from the Entities list below.
- Replace pronouns with the full entity name from the Entities list; if unsure, drop the triple.
- Type constraints:
  - {constraints}
- If no valid triple exists, return an empty list.

OUTPUT JSON ONLY in this exact format:
{{"relations": [{{"subject": "<entity>", "predicate": "<predicate>", "object": "<entity>"}}]}}

Text:
"""{text}"""

Entities:
{entities}
"#,
            predicates = predicates.join("\n- "),
            constraints = constraints.join("\n  - "),
            text = text,
            entities = serde_json::to_string(&entity_names).unwrap_or_default(),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

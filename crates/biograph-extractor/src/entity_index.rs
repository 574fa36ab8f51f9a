//! Per-document entity index
//!
//! Turns raw NER spans into entities and exposes a normalized-text lookup
//! used by relation resolution. Conflicting spans (same normalized text,
//! different type) are resolved first-seen-wins.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use biograph_core::{normalize_text, BiographError, Entity, EntitySpan, EntityType};

/// A span discarded because its text was already bound to another type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionConflict {
    pub text: String,
    pub kept: EntityType,
    pub discarded: EntityType,
    pub start: usize,
    pub end: usize,
}

impl From<&ResolutionConflict> for BiographError {
    fn from(conflict: &ResolutionConflict) -> Self {
        BiographError::ResolutionError {
            text: conflict.text.clone(),
            kept: conflict.kept.clone(),
            discarded: conflict.discarded.clone(),
        }
    }
}

/// Entities of one document, keyed by id and by normalized surface text
#[derive(Debug, Clone, Default)]
pub struct EntityIndex {
    doc_id: String,
    entities: Vec<Entity>,
    by_id: HashMap<String, usize>,
    by_text: HashMap<String, usize>,
    conflicts: Vec<ResolutionConflict>,
}

impl EntityIndex {
    /// Build the index from spans in document order
    pub fn build(doc_id: impl Into<String>, spans: &[EntitySpan]) -> Self {
        let mut index = Self {
            doc_id: doc_id.into(),
            ..Default::default()
        };
        for span in spans {
            index.insert(span);
        }
        index
    }

    fn insert(&mut self, span: &EntitySpan) {
        let normalized = normalize_text(&span.text);
        if normalized.is_empty() {
            return;
        }
        let entity_type = EntityType::from_label(&span.label);

        if let Some(&idx) = self.by_text.get(&normalized) {
            let existing = &self.entities[idx];
            if existing.entity_type != entity_type {
                let conflict = ResolutionConflict {
                    text: span.text.clone(),
                    kept: existing.entity_type.clone(),
                    discarded: entity_type,
                    start: span.start,
                    end: span.end,
                };
                warn!(
                    doc_id = %self.doc_id,
                    error = %BiographError::from(&conflict),
                    "discarding conflicting entity span"
                );
                self.conflicts.push(conflict);
            }
            return;
        }

        let entity = Entity::from_span(span, entity_type, self.doc_id.clone());
        if let Some(&idx) = self.by_id.get(&entity.id) {
            // Distinct texts can still derive one id ("a_b" vs "a b").
            debug!(doc_id = %self.doc_id, id = %entity.id, "span maps to an existing entity id");
            self.by_text.insert(normalized, idx);
            return;
        }

        let idx = self.entities.len();
        self.by_id.insert(entity.id.clone(), idx);
        self.by_text.insert(normalized, idx);
        self.entities.push(entity);
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    /// Resolve surface text (case-insensitive, whitespace-collapsed)
    pub fn lookup(&self, text: &str) -> Option<&Entity> {
        self.by_text
            .get(&normalize_text(text))
            .map(|&idx| &self.entities[idx])
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.by_id.get(id).map(|&idx| &self.entities[idx])
    }

    /// Entities in first-seen order
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn persons(&self) -> impl Iterator<Item = &Entity> {
        self.entities
            .iter()
            .filter(|e| e.entity_type == EntityType::Person)
    }

    pub fn conflicts(&self) -> &[ResolutionConflict] {
        &self.conflicts
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn into_entities(self) -> Vec<Entity> {
        self.entities
    }
}

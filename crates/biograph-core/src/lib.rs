//! Biograph Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the biograph system:
//! - Entity, relation and personality models
//! - The error taxonomy shared by every pipeline stage
//! - Injected schema configuration (predicates, type constraints, vocabulary)
//! - Collaborator traits for NER and LLM backends
//! - Ground truth records used by evaluation

pub mod config;
pub mod ground_truth;
pub mod schema;

pub use config::{
    AppConfig, ConfigError, LlmConfig, LlmProvider, LoggingConfig, NodeCollisionPolicy,
    PersonalityConflictPolicy, PipelineConfig, RetryConfig,
};
pub use ground_truth::{GroundTruthEntity, GroundTruthPersonality, GroundTruthRecord, GroundTruthTriple};
pub use schema::{SchemaConfig, TypeConstraint};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for biograph operations
#[derive(Error, Debug)]
pub enum BiographError {
    #[error("Schema violation: predicate '{0}' is not part of the schema")]
    SchemaViolation(String),

    #[error("Unresolved reference: '{0}'")]
    UnresolvedReference(String),

    #[error("Type constraint violation: {predicate} does not accept {subject_type} -> {object_type}")]
    TypeConstraintViolation {
        predicate: Predicate,
        subject_type: EntityType,
        object_type: EntityType,
    },

    #[error("Missing personality dimension: {0}")]
    MissingDimension(Dimension),

    #[error("Malformed personality output for {person_id}: {reason}")]
    MalformedPersonalityOutput { person_id: String, reason: String },

    #[error("Collaborator failed after {attempts} attempt(s): {message}")]
    TransientCollaboratorFailure { attempts: usize, message: String },

    #[error("Conflicting entity types for '{text}': kept {kept}, discarded {discarded}")]
    ResolutionError {
        text: String,
        kept: EntityType,
        discarded: EntityType,
    },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("NER error: {0}")]
    Ner(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BiographError {
    /// The per-triple discard reason this error represents, if any
    pub fn discard_reason(&self) -> Option<DiscardReason> {
        match self {
            Self::SchemaViolation(_) => Some(DiscardReason::SchemaViolation),
            Self::UnresolvedReference(_) => Some(DiscardReason::UnresolvedReference),
            Self::TypeConstraintViolation { .. } => Some(DiscardReason::TypeConstraintViolation),
            _ => None,
        }
    }

    /// Whether retrying the collaborator call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Llm(_) | Self::Ner(_) | Self::TransientCollaboratorFailure { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BiographError>;

/// Why a candidate triple was rejected by the relation filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    SchemaViolation,
    UnresolvedReference,
    TypeConstraintViolation,
}

// ============================================================================
// Entities
// ============================================================================

/// Normalize surface text for lookups: trimmed, whitespace-collapsed, lowercase
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Entity type label
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    Person,
    Org,
    Loc,
    /// Any other NER label, kept upper-case
    Other(String),
}

impl EntityType {
    /// Map a raw NER label onto an entity type.
    ///
    /// GPE is folded into LOC so that "lives in" accepts both.
    pub fn from_label(label: &str) -> Self {
        let upper = label.trim().to_uppercase();
        match upper.as_str() {
            "PERSON" | "PER" => Self::Person,
            "ORG" | "ORGANIZATION" | "ORGANISATION" => Self::Org,
            "LOC" | "GPE" | "LOCATION" => Self::Loc,
            _ => Self::Other(upper),
        }
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Person => "PERSON",
            Self::Org => "ORG",
            Self::Loc => "LOC",
            Self::Other(label) => label.as_str(),
        }
    }
}

impl From<String> for EntityType {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl From<EntityType> for String {
    fn from(entity_type: EntityType) -> Self {
        entity_type.as_str().to_string()
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw span produced by an NER collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub text: String,
    pub label: String,
    pub start: usize,
    pub end: usize,
}

impl EntitySpan {
    pub fn new(text: impl Into<String>, label: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            text: text.into(),
            label: label.into(),
            start,
            end,
        }
    }
}

/// An entity recognized in one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Deterministic identifier, see [`Entity::derive_id`]
    pub id: String,

    /// Surface text as it first appeared
    pub surface_text: String,

    /// Entity type
    #[serde(rename = "type")]
    pub entity_type: EntityType,

    /// Document the entity was first seen in
    pub source_doc_id: String,

    /// Character offsets of the first mention
    pub start: usize,
    pub end: usize,
}

impl Entity {
    /// Create an entity from its first span in a document
    pub fn from_span(span: &EntitySpan, entity_type: EntityType, doc_id: impl Into<String>) -> Self {
        let id = Self::derive_id(&entity_type, &span.text);
        Self {
            id,
            surface_text: span.text.trim().to_string(),
            entity_type,
            source_doc_id: doc_id.into(),
            start: span.start,
            end: span.end,
        }
    }

    /// Derive an entity id from type and surface text, e.g. `person:jonas_park`
    pub fn derive_id(entity_type: &EntityType, text: &str) -> String {
        format!(
            "{}:{}",
            entity_type.as_str().to_lowercase(),
            normalize_text(text).replace(' ', "_")
        )
    }

    /// Normalized surface text used for lookups and evaluation
    pub fn normalized_text(&self) -> String {
        normalize_text(&self.surface_text)
    }
}

// ============================================================================
// Relations
// ============================================================================

/// The closed set of predicates the schema allows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    WorksFor,
    StudiedAt,
    LivesIn,
    CollaboratesWith,
    ReportsTo,
}

impl Predicate {
    pub const ALL: [Predicate; 5] = [
        Self::WorksFor,
        Self::StudiedAt,
        Self::LivesIn,
        Self::CollaboratesWith,
        Self::ReportsTo,
    ];

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorksFor => "works_for",
            Self::StudiedAt => "studied_at",
            Self::LivesIn => "lives_in",
            Self::CollaboratesWith => "collaborates_with",
            Self::ReportsTo => "reports_to",
        }
    }

    /// Parse the exact canonical name
    pub fn from_canonical(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw triple as proposed by the relation LLM, untrusted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRelation {
    pub subject_text: String,
    pub predicate_raw: String,
    pub object_text: String,
    pub source_doc_id: String,
}

impl CandidateRelation {
    pub fn new(
        subject_text: impl Into<String>,
        predicate_raw: impl Into<String>,
        object_text: impl Into<String>,
        source_doc_id: impl Into<String>,
    ) -> Self {
        Self {
            subject_text: subject_text.into(),
            predicate_raw: predicate_raw.into(),
            object_text: object_text.into(),
            source_doc_id: source_doc_id.into(),
        }
    }
}

/// Identity of a validated relation
pub type RelationKey = (String, Predicate, String);

/// A relation that passed schema, resolution and type checks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatedRelation {
    pub subject_id: String,
    pub predicate: Predicate,
    pub object_id: String,
    /// Provenance of the first occurrence
    pub source_doc_id: String,
}

impl ValidatedRelation {
    pub fn key(&self) -> RelationKey {
        (self.subject_id.clone(), self.predicate, self.object_id.clone())
    }
}

// ============================================================================
// Personality
// ============================================================================

/// One of the Big Five personality dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Openness,
    Conscientiousness,
    Extraversion,
    Agreeableness,
    Neuroticism,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Self::Openness,
        Self::Conscientiousness,
        Self::Extraversion,
        Self::Agreeableness,
        Self::Neuroticism,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openness => "openness",
            Self::Conscientiousness => "conscientiousness",
            Self::Extraversion => "extraversion",
            Self::Agreeableness => "agreeableness",
            Self::Neuroticism => "neuroticism",
        }
    }

    /// Match a field name by full name or initial, case-insensitive
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == key || d.as_str()[..1] == key)
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Big Five scores, each in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BigFive {
    pub openness: f64,
    pub conscientiousness: f64,
    pub extraversion: f64,
    pub agreeableness: f64,
    pub neuroticism: f64,
}

impl BigFive {
    pub const MIDPOINT: f64 = 0.5;

    pub fn new(o: f64, c: f64, e: f64, a: f64, n: f64) -> Self {
        Self {
            openness: o,
            conscientiousness: c,
            extraversion: e,
            agreeableness: a,
            neuroticism: n,
        }
    }

    /// All dimensions at the midpoint
    pub fn midpoint() -> Self {
        let m = Self::MIDPOINT;
        Self::new(m, m, m, m, m)
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Openness => self.openness,
            Dimension::Conscientiousness => self.conscientiousness,
            Dimension::Extraversion => self.extraversion,
            Dimension::Agreeableness => self.agreeableness,
            Dimension::Neuroticism => self.neuroticism,
        }
    }

    pub fn set(&mut self, dimension: Dimension, value: f64) {
        match dimension {
            Dimension::Openness => self.openness = value,
            Dimension::Conscientiousness => self.conscientiousness = value,
            Dimension::Extraversion => self.extraversion = value,
            Dimension::Agreeableness => self.agreeableness = value,
            Dimension::Neuroticism => self.neuroticism = value,
        }
    }

    /// Mean absolute difference across the five dimensions
    pub fn mean_absolute_error(&self, other: &BigFive) -> f64 {
        Dimension::ALL
            .iter()
            .map(|d| (self.get(*d) - other.get(*d)).abs())
            .sum::<f64>()
            / Dimension::ALL.len() as f64
    }

    pub fn in_range(&self) -> bool {
        Dimension::ALL
            .iter()
            .all(|d| (0.0..=1.0).contains(&self.get(*d)))
    }
}

/// Validated personality inference for one person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalityRecord {
    pub person_id: String,
    pub big_five: BigFive,
    pub traits: BTreeSet<String>,
    pub source_doc_id: String,
}

// ============================================================================
// Documents
// ============================================================================

/// An input document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,

    /// Sentence segmentation, if the corpus provides one
    #[serde(default)]
    pub sentences: Vec<String>,

    /// Precomputed NER spans, if the corpus provides them
    #[serde(default)]
    pub entities: Option<Vec<EntitySpan>>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            sentences: Vec::new(),
            entities: None,
        }
    }

    pub fn with_sentences(mut self, sentences: Vec<String>) -> Self {
        self.sentences = sentences;
        self
    }

    pub fn with_entities(mut self, entities: Vec<EntitySpan>) -> Self {
        self.entities = Some(entities);
        self
    }
}

/// Validated output of one document's extraction, ready to be assembled
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentArtifacts {
    pub doc_id: String,
    pub entities: Vec<Entity>,
    pub relations: Vec<ValidatedRelation>,
    pub personalities: Vec<PersonalityRecord>,
}

// ============================================================================
// Traits
// ============================================================================

/// Trait for NER collaborators
pub trait EntityRecognizer: Send + Sync {
    /// Return spans in document order
    fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>>;
}

/// Trait for LLM clients
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a response
    async fn generate(&self, prompt: &str) -> Result<String>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Jonas   Park "), "jonas park");
        assert_eq!(normalize_text("Orion\tSystems"), "orion systems");
    }

    #[test]
    fn test_entity_type_from_label() {
        assert_eq!(EntityType::from_label("person"), EntityType::Person);
        assert_eq!(EntityType::from_label("GPE"), EntityType::Loc);
        assert_eq!(
            EntityType::from_label("date"),
            EntityType::Other("DATE".to_string())
        );
    }

    #[test]
    fn test_entity_type_serde() {
        let json = serde_json::to_string(&EntityType::Org).unwrap();
        assert_eq!(json, "\"ORG\"");
        let parsed: EntityType = serde_json::from_str("\"GPE\"").unwrap();
        assert_eq!(parsed, EntityType::Loc);
    }

    #[test]
    fn test_derive_id() {
        assert_eq!(
            Entity::derive_id(&EntityType::Person, " Jonas  Park"),
            "person:jonas_park"
        );
    }

    #[test]
    fn test_predicate_round_trip_names() {
        for p in Predicate::ALL {
            assert_eq!(Predicate::from_canonical(p.as_str()), Some(p));
        }
        assert_eq!(Predicate::from_canonical("has_trait"), None);
    }

    #[test]
    fn test_dimension_from_key() {
        assert_eq!(Dimension::from_key("Openness"), Some(Dimension::Openness));
        assert_eq!(Dimension::from_key("N"), Some(Dimension::Neuroticism));
        assert_eq!(Dimension::from_key("humility"), None);
    }

    #[test]
    fn test_big_five_mae() {
        let predicted = BigFive::new(0.8, 0.5, 0.2, 0.5, 0.2);
        let truth = BigFive::new(0.8, 0.8, 0.2, 0.5, 0.5);
        assert!((predicted.mean_absolute_error(&truth) - 0.12).abs() < 1e-9);
    }

    #[test]
    fn test_discard_reason_mapping() {
        let err = BiographError::SchemaViolation("likes".to_string());
        assert_eq!(err.discard_reason(), Some(DiscardReason::SchemaViolation));
        assert!(BiographError::Ner("down".to_string()).discard_reason().is_none());
    }
}

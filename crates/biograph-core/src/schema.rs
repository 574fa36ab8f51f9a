//! Extraction schema
//!
//! The closed set of predicates, their subject/object type constraints,
//! the approved personality vocabulary and the pronoun stoplist. A
//! [`SchemaConfig`] is built once and handed to each component at
//! construction; nothing here is process-global.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::{normalize_text, EntityType, Predicate};

/// Allowed subject and object types for one predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeConstraint {
    pub predicate: Predicate,
    pub subject: Vec<EntityType>,
    pub object: Vec<EntityType>,
}

impl TypeConstraint {
    pub fn new(predicate: Predicate, subject: EntityType, object: EntityType) -> Self {
        Self {
            predicate,
            subject: vec![subject],
            object: vec![object],
        }
    }

    pub fn accepts(&self, subject: &EntityType, object: &EntityType) -> bool {
        self.subject.contains(subject) && self.object.contains(object)
    }
}

/// Schema configuration injected into the filter and reconciler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Free-text predicate phrasings mapped onto the fixed predicate set
    pub predicate_aliases: BTreeMap<String, Predicate>,

    /// One constraint per predicate
    pub type_constraints: Vec<TypeConstraint>,

    /// Approved personality adjectives
    pub vocabulary: BTreeSet<String>,

    /// Subjects/objects that are never resolved to an entity
    pub pronouns: BTreeSet<String>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        let aliases: &[(&str, Predicate)] = &[
            ("works at", Predicate::WorksFor),
            ("is employed by", Predicate::WorksFor),
            ("employed by", Predicate::WorksFor),
            ("is employed at", Predicate::WorksFor),
            ("employed at", Predicate::WorksFor),
            ("studied at", Predicate::StudiedAt),
            ("graduated from", Predicate::StudiedAt),
            ("attended", Predicate::StudiedAt),
            ("is a graduate of", Predicate::StudiedAt),
            ("alumnus of", Predicate::StudiedAt),
            ("alumna of", Predicate::StudiedAt),
            ("lives in", Predicate::LivesIn),
            ("resides in", Predicate::LivesIn),
            ("is based in", Predicate::LivesIn),
            ("based in", Predicate::LivesIn),
            ("settled in", Predicate::LivesIn),
            ("collaborates with", Predicate::CollaboratesWith),
            ("works with", Predicate::CollaboratesWith),
            ("worked with", Predicate::CollaboratesWith),
            ("partners with", Predicate::CollaboratesWith),
            ("reports to", Predicate::ReportsTo),
            ("is managed by", Predicate::ReportsTo),
            ("managed by", Predicate::ReportsTo),
            ("works under", Predicate::ReportsTo),
        ];

        let vocabulary = [
            "curious",
            "inventive",
            "reflective",
            "organized",
            "meticulous",
            "pragmatic",
            "systematic",
            "outspoken",
            "energetic",
            "sociable",
            "empathetic",
            "diplomatic",
            "cooperative",
            "collaborative",
            "decisive",
            "resilient",
            "anxious",
        ];

        let pronouns = [
            "he", "she", "they", "it", "him", "her", "them", "his", "hers", "their", "theirs",
            "its", "himself", "herself", "themselves", "we", "us", "i", "me", "you",
        ];

        Self {
            predicate_aliases: aliases
                .iter()
                .map(|(alias, p)| (alias.to_string(), *p))
                .collect(),
            type_constraints: vec![
                TypeConstraint::new(Predicate::WorksFor, EntityType::Person, EntityType::Org),
                TypeConstraint::new(Predicate::StudiedAt, EntityType::Person, EntityType::Org),
                TypeConstraint::new(Predicate::LivesIn, EntityType::Person, EntityType::Loc),
                TypeConstraint::new(
                    Predicate::CollaboratesWith,
                    EntityType::Person,
                    EntityType::Person,
                ),
                TypeConstraint::new(Predicate::ReportsTo, EntityType::Person, EntityType::Person),
            ],
            vocabulary: vocabulary.iter().map(|s| s.to_string()).collect(),
            pronouns: pronouns.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SchemaConfig {
    /// Normalize a raw predicate phrase: lowercase, `_`/`-` as spaces, whitespace collapsed
    pub fn normalize_predicate(raw: &str) -> String {
        normalize_text(&raw.replace(['_', '-'], " "))
    }

    /// Build the lookup from normalized phrasing to predicate.
    ///
    /// Canonical names are always included; aliases cannot shadow them.
    pub fn predicate_lookup(&self) -> HashMap<String, Predicate> {
        let mut lookup: HashMap<String, Predicate> = self
            .predicate_aliases
            .iter()
            .map(|(alias, p)| (Self::normalize_predicate(alias), *p))
            .collect();
        for p in Predicate::ALL {
            lookup.insert(Self::normalize_predicate(p.as_str()), p);
        }
        lookup
    }

    pub fn constraint(&self, predicate: Predicate) -> Option<&TypeConstraint> {
        self.type_constraints
            .iter()
            .find(|c| c.predicate == predicate)
    }

    /// Whether `predicate` accepts a `subject -> object` type pair
    pub fn allows(&self, predicate: Predicate, subject: &EntityType, object: &EntityType) -> bool {
        self.constraint(predicate)
            .map(|c| c.accepts(subject, object))
            .unwrap_or(false)
    }

    pub fn is_pronoun(&self, text: &str) -> bool {
        self.pronouns.contains(&normalize_text(text))
    }

    pub fn in_vocabulary(&self, word: &str) -> bool {
        self.vocabulary.contains(&normalize_text(word))
    }

    /// Check that every predicate has exactly one non-empty constraint
    pub fn validate(&self) -> Result<(), ConfigError> {
        for p in Predicate::ALL {
            let matching: Vec<_> = self
                .type_constraints
                .iter()
                .filter(|c| c.predicate == p)
                .collect();
            match matching.as_slice() {
                [] => {
                    return Err(ConfigError::MissingRequired(format!(
                        "schema.type_constraints for {p}"
                    )))
                }
                [c] if c.subject.is_empty() || c.object.is_empty() => {
                    return Err(ConfigError::InvalidValue {
                        key: format!("schema.type_constraints.{p}"),
                        value: "empty type list".to_string(),
                    })
                }
                [_] => {}
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: format!("schema.type_constraints.{p}"),
                        value: "duplicate constraint".to_string(),
                    })
                }
            }
        }

        if let Some(word) = self.vocabulary.iter().find(|w| normalize_text(w) != **w) {
            return Err(ConfigError::InvalidValue {
                key: "schema.vocabulary".to_string(),
                value: word.clone(),
            });
        }

        Ok(())
    }

    /// Render the predicate/type table for prompts and the CLI
    pub fn describe_constraints(&self) -> Vec<String> {
        Predicate::ALL
            .iter()
            .filter_map(|p| self.constraint(*p))
            .map(|c| {
                let join = |types: &[EntityType]| {
                    types
                        .iter()
                        .map(|t| t.as_str().to_string())
                        .collect::<Vec<_>>()
                        .join(" or ")
                };
                format!(
                    "{}: {} -> {}",
                    c.predicate,
                    join(&c.subject),
                    join(&c.object)
                )
            })
            .collect()
    }
}

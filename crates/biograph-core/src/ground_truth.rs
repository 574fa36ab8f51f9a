//! Ground truth records
//!
//! Externally supplied reference data for evaluation. The loader accepts
//! the synthetic generator's shape (`{id, type, name}` entities, `[s, p, o]`
//! triples, personality keyed by person id) and can rewrite its ids into
//! the derived entity id space used by the pipeline.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{BigFive, Entity, EntityType, Predicate, RelationKey, Result};

/// Reference entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthEntity {
    pub id: String,

    #[serde(alias = "name")]
    pub surface_text: String,

    #[serde(rename = "type", alias = "entity_type")]
    pub entity_type: EntityType,
}

/// Reference triple, serialized as `[subject_id, predicate, object_id]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroundTruthTriple(pub String, pub Predicate, pub String);

impl GroundTruthTriple {
    pub fn key(&self) -> RelationKey {
        (self.0.clone(), self.1, self.2.clone())
    }
}

/// Reference personality for one person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthPersonality {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub big_five: BigFive,
    #[serde(default)]
    pub traits: BTreeSet<String>,
}

/// The full reference record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthRecord {
    #[serde(default)]
    pub entities: Vec<GroundTruthEntity>,
    #[serde(default)]
    pub relations: Vec<GroundTruthTriple>,
    #[serde(default)]
    pub personality: BTreeMap<String, GroundTruthPersonality>,
}

impl GroundTruthRecord {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Rewrite every id into the derived `<type>:<normalized_name>` form.
    ///
    /// Relation endpoints and personality keys that do not name a known
    /// entity are left untouched.
    pub fn canonicalize(mut self) -> Self {
        let id_map: HashMap<String, String> = self
            .entities
            .iter()
            .map(|e| {
                (
                    e.id.clone(),
                    Entity::derive_id(&e.entity_type, &e.surface_text),
                )
            })
            .collect();

        let remap = |id: &str| -> String {
            match id_map.get(id) {
                Some(canonical) => canonical.clone(),
                None => {
                    tracing::warn!(id, "ground truth id does not name a known entity");
                    id.to_string()
                }
            }
        };

        self.relations = self
            .relations
            .iter()
            .map(|GroundTruthTriple(s, p, o)| GroundTruthTriple(remap(s), *p, remap(o)))
            .collect();

        self.personality = self
            .personality
            .iter()
            .map(|(id, record)| (remap(id), record.clone()))
            .collect();

        for entity in &mut self.entities {
            if let Some(canonical) = id_map.get(&entity.id) {
                entity.id = canonical.clone();
            }
        }

        self
    }
}

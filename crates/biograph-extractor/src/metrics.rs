//! Quality Metrics module
//!
//! Compares assembled artifacts with a ground truth record. Entity and
//! relation quality are set-based precision/recall/F1; personality quality
//! is Big Five MAE and trait Jaccard over persons present on both sides.
//! Each group is computed independently of the others.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use biograph_core::{
    normalize_text, Entity, EntityType, GroundTruthEntity, GroundTruthPersonality,
    GroundTruthRecord, GroundTruthTriple, PersonalityRecord, RelationKey, ValidatedRelation,
};
use biograph_graph::KnowledgeGraph;

// ============================================================================
// Set Metrics
// ============================================================================

/// Confusion counts for one set-based comparison
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetMetrics {
    /// Items present in both sets
    pub true_positives: usize,
    /// Predicted items absent from the gold set
    pub false_positives: usize,
    /// Gold items that were not predicted
    pub false_negatives: usize,
    pub gold_total: usize,
    pub predicted_total: usize,
}

impl SetMetrics {
    /// Compare two sets
    pub fn from_sets<T: Eq + std::hash::Hash>(predicted: &HashSet<T>, gold: &HashSet<T>) -> Self {
        let true_positives = predicted.intersection(gold).count();
        Self {
            true_positives,
            false_positives: predicted.len() - true_positives,
            false_negatives: gold.len() - true_positives,
            gold_total: gold.len(),
            predicted_total: predicted.len(),
        }
    }

    /// Calculate precision (TP / (TP + FP))
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    /// Calculate recall (TP / (TP + FN))
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    /// Calculate F1 score (2 * P * R / (P + R))
    pub fn f1_score(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    pub fn scores(&self) -> PrfScores {
        PrfScores {
            precision: self.precision(),
            recall: self.recall(),
            f1: self.f1_score(),
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Precision, recall and F1 as reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PrfScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Personality agreement over persons present on both sides
///
/// Persons present on only one side are excluded from both averages and
/// counted in `persons_excluded`. With no shared person both scores are
/// `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalityScores {
    pub mae: Option<f64>,
    pub jaccard: Option<f64>,
    pub persons_evaluated: usize,
    pub persons_excluded: usize,
}

// ============================================================================
// Report
// ============================================================================

/// Full evaluation result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub entity: PrfScores,
    pub relation: PrfScores,
    pub personality: PersonalityScores,
    pub entity_counts: SetMetrics,
    pub relation_counts: SetMetrics,
}

impl MetricsReport {
    /// Human-readable summary
    pub fn render(&self) -> String {
        let optional = |v: Option<f64>| match v {
            Some(v) => format!("{v:.3}"),
            None => "n/a".to_string(),
        };

        format!(
            "=== Extraction Quality Report ===\n\n\
             Entity Extraction:\n\
               Precision: {:.1}%\n\
               Recall:    {:.1}%\n\
               F1 Score:  {:.1}%\n\
               Gold: {} | Predicted: {} | TP: {} | FP: {} | FN: {}\n\n\
             Relation Extraction:\n\
               Precision: {:.1}%\n\
               Recall:    {:.1}%\n\
               F1 Score:  {:.1}%\n\
               Gold: {} | Predicted: {} | TP: {} | FP: {} | FN: {}\n\n\
             Personality:\n\
               Big Five MAE:  {}\n\
               Trait Jaccard: {}\n\
               Persons evaluated: {} | excluded (one side only): {}\n",
            self.entity.precision * 100.0,
            self.entity.recall * 100.0,
            self.entity.f1 * 100.0,
            self.entity_counts.gold_total,
            self.entity_counts.predicted_total,
            self.entity_counts.true_positives,
            self.entity_counts.false_positives,
            self.entity_counts.false_negatives,
            self.relation.precision * 100.0,
            self.relation.recall * 100.0,
            self.relation.f1 * 100.0,
            self.relation_counts.gold_total,
            self.relation_counts.predicted_total,
            self.relation_counts.true_positives,
            self.relation_counts.false_positives,
            self.relation_counts.false_negatives,
            optional(self.personality.mae),
            optional(self.personality.jaccard),
            self.personality.persons_evaluated,
            self.personality.persons_excluded,
        )
    }
}

// ============================================================================
// Evaluator
// ============================================================================

/// Evaluator for extraction quality
pub struct Evaluator {
    /// Entity type must match as well as text
    match_types: bool,
}

impl Evaluator {
    pub fn new() -> Self {
        Self { match_types: true }
    }

    /// Enable/disable type matching for entities
    pub fn with_type_matching(mut self, match_types: bool) -> Self {
        self.match_types = match_types;
        self
    }

    fn entity_key(&self, text: &str, entity_type: &EntityType) -> (String, Option<EntityType>) {
        let entity_type = self.match_types.then(|| entity_type.clone());
        (normalize_text(text), entity_type)
    }

    /// Set comparison on `(normalized surface text, type)`
    pub fn evaluate_entities(&self, predicted: &[Entity], gold: &[GroundTruthEntity]) -> SetMetrics {
        let predicted: HashSet<_> = predicted
            .iter()
            .map(|e| self.entity_key(&e.surface_text, &e.entity_type))
            .collect();
        let gold: HashSet<_> = gold
            .iter()
            .map(|e| self.entity_key(&e.surface_text, &e.entity_type))
            .collect();
        SetMetrics::from_sets(&predicted, &gold)
    }

    /// Set comparison on `(subject_id, predicate, object_id)`
    pub fn evaluate_relations(
        &self,
        predicted: &[ValidatedRelation],
        gold: &[GroundTruthTriple],
    ) -> SetMetrics {
        let predicted: HashSet<RelationKey> = predicted.iter().map(ValidatedRelation::key).collect();
        let gold: HashSet<RelationKey> = gold.iter().map(GroundTruthTriple::key).collect();
        SetMetrics::from_sets(&predicted, &gold)
    }

    /// Big Five MAE and trait Jaccard, keyed by person id
    pub fn evaluate_personality(
        &self,
        predicted: &[PersonalityRecord],
        gold: &BTreeMap<String, GroundTruthPersonality>,
    ) -> PersonalityScores {
        let predicted: BTreeMap<&str, &PersonalityRecord> = predicted
            .iter()
            .map(|r| (r.person_id.as_str(), r))
            .collect();

        let mut errors = Vec::new();
        let mut jaccards = Vec::new();
        for (person_id, record) in &predicted {
            if let Some(truth) = gold.get(*person_id) {
                errors.push(record.big_five.mean_absolute_error(&truth.big_five));
                let gold_traits: BTreeSet<String> =
                    truth.traits.iter().map(|t| normalize_text(t)).collect();
                jaccards.push(jaccard(&record.traits, &gold_traits));
            }
        }

        let shared = errors.len();
        let union = predicted
            .keys()
            .copied()
            .chain(gold.keys().map(String::as_str))
            .collect::<BTreeSet<_>>()
            .len();

        PersonalityScores {
            mae: mean(&errors),
            jaccard: mean(&jaccards),
            persons_evaluated: shared,
            persons_excluded: union - shared,
        }
    }

    /// Evaluate an assembled graph against canonicalized ground truth
    pub fn evaluate(&self, graph: &KnowledgeGraph, truth: &GroundTruthRecord) -> MetricsReport {
        let entities: Vec<Entity> = graph.entities().cloned().collect();
        let relations: Vec<ValidatedRelation> = graph.relations().cloned().collect();
        let personalities: Vec<PersonalityRecord> = graph.personalities().cloned().collect();

        let entity_counts = self.evaluate_entities(&entities, &truth.entities);
        let relation_counts = self.evaluate_relations(&relations, &truth.relations);
        let personality = self.evaluate_personality(&personalities, &truth.personality);

        let report = MetricsReport {
            entity: entity_counts.scores(),
            relation: relation_counts.scores(),
            personality,
            entity_counts,
            relation_counts,
        };

        info!(
            entity_f1 = report.entity.f1,
            relation_f1 = report.relation.f1,
            mae = ?report.personality.mae,
            jaccard = ?report.personality.jaccard,
            "evaluation complete"
        );
        report
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Intersection over union; two empty sets agree perfectly (1.0)
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Deterministic graph assembly
//!
//! Folds validated per-document artifacts into one [`KnowledgeGraph`].
//! Merge decisions are order-dependent, so the assembler is a single
//! writer fed one document at a time in a fixed order.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use biograph_core::{
    DocumentArtifacts, Entity, NodeCollisionPolicy, PersonalityConflictPolicy, PersonalityRecord,
    PipelineConfig, ValidatedRelation,
};

use crate::KnowledgeGraph;

/// Tie-break strategies for node and personality collisions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePolicy {
    pub node_collision: NodeCollisionPolicy,
    pub personality_conflict: PersonalityConflictPolicy,
}

impl MergePolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            node_collision: config.node_collision,
            personality_conflict: config.personality_conflict,
        }
    }
}

/// Two documents disagreed about one person's personality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalityConflict {
    pub person_id: String,
    pub kept_doc: String,
    pub discarded_doc: String,
}

/// What happened while assembling
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssemblyReport {
    pub documents: usize,
    pub nodes_added: usize,
    /// Entity ids seen again in a later position
    pub duplicate_nodes: usize,
    pub edges_added: usize,
    /// Exact `(subject, predicate, object)` repeats merged into one edge
    pub duplicate_edges: usize,
    /// Relations whose subject or object is not a node
    pub dangling_edges: usize,
    /// Personality records for unknown or non-PERSON nodes
    pub orphan_personality: usize,
    pub personality_conflicts: Vec<PersonalityConflict>,
}

pub struct GraphAssembler {
    graph: KnowledgeGraph,
    policy: MergePolicy,
    report: AssemblyReport,
}

impl GraphAssembler {
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            graph: KnowledgeGraph::new(),
            policy,
            report: AssemblyReport::default(),
        }
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    /// Fold one document: entities, then relations, then personality
    pub fn add_document(&mut self, artifacts: &DocumentArtifacts) {
        for entity in &artifacts.entities {
            self.add_entity(entity);
        }
        for relation in &artifacts.relations {
            self.add_relation(relation);
        }
        for record in &artifacts.personalities {
            self.add_personality(record);
        }
        self.report.documents += 1;

        debug!(
            doc_id = %artifacts.doc_id,
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            "document assembled"
        );
    }

    fn add_entity(&mut self, entity: &Entity) {
        let Some(node) = self.graph.node_mut(&entity.id) else {
            self.graph.insert_node(entity.clone());
            self.report.nodes_added += 1;
            return;
        };

        self.report.duplicate_nodes += 1;
        match self.policy.node_collision {
            NodeCollisionPolicy::KeepFirst => {
                debug!(id = %entity.id, doc_id = %entity.source_doc_id, "node exists, keeping first");
            }
            NodeCollisionPolicy::KeepLatest => {
                debug!(id = %entity.id, doc_id = %entity.source_doc_id, "node exists, keeping latest");
                node.entity = entity.clone();
            }
        }
    }

    fn add_relation(&mut self, relation: &ValidatedRelation) {
        if !self.graph.contains(&relation.subject_id) || !self.graph.contains(&relation.object_id) {
            warn!(
                subject = %relation.subject_id,
                predicate = %relation.predicate,
                object = %relation.object_id,
                doc_id = %relation.source_doc_id,
                "skipping relation with a missing endpoint"
            );
            self.report.dangling_edges += 1;
            return;
        }

        if self
            .graph
            .has_relation(&relation.subject_id, relation.predicate, &relation.object_id)
        {
            self.report.duplicate_edges += 1;
            return;
        }

        match self.graph.insert_edge(relation.clone()) {
            Ok(()) => self.report.edges_added += 1,
            Err(e) => {
                warn!(error = %e, "skipping relation");
                self.report.dangling_edges += 1;
            }
        }
    }

    fn add_personality(&mut self, record: &PersonalityRecord) {
        let policy = self.policy.personality_conflict;
        let node = match self.graph.node_mut(&record.person_id) {
            Some(node) if node.is_person() => node,
            _ => {
                warn!(
                    person_id = %record.person_id,
                    doc_id = %record.source_doc_id,
                    "personality record has no PERSON node"
                );
                self.report.orphan_personality += 1;
                return;
            }
        };

        let Some(existing) = node.personality.as_ref() else {
            node.personality = Some(record.clone());
            return;
        };

        let agrees = existing.big_five == record.big_five && existing.traits == record.traits;
        let conflict = match policy {
            PersonalityConflictPolicy::LastWriteWins => PersonalityConflict {
                person_id: record.person_id.clone(),
                kept_doc: record.source_doc_id.clone(),
                discarded_doc: existing.source_doc_id.clone(),
            },
            PersonalityConflictPolicy::FirstWriteWins => PersonalityConflict {
                person_id: record.person_id.clone(),
                kept_doc: existing.source_doc_id.clone(),
                discarded_doc: record.source_doc_id.clone(),
            },
        };

        if policy == PersonalityConflictPolicy::LastWriteWins {
            node.personality = Some(record.clone());
        }

        if !agrees {
            warn!(
                person_id = %conflict.person_id,
                kept_doc = %conflict.kept_doc,
                discarded_doc = %conflict.discarded_doc,
                ?policy,
                "conflicting personality records across documents"
            );
            self.report.personality_conflicts.push(conflict);
        }
    }

    pub fn finish(self) -> (KnowledgeGraph, AssemblyReport) {
        info!(
            documents = self.report.documents,
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            duplicate_edges = self.report.duplicate_edges,
            dangling_edges = self.report.dangling_edges,
            personality_conflicts = self.report.personality_conflicts.len(),
            "graph assembled"
        );
        (self.graph, self.report)
    }
}

impl Default for GraphAssembler {
    fn default() -> Self {
        Self::new(MergePolicy::default())
    }
}

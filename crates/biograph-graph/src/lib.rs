//! Biograph Graph - In-memory knowledge graph
//!
//! Nodes are entities (PERSON nodes may carry a personality record), edges
//! are validated relations labelled with their predicate. The graph is
//! built by [`GraphAssembler`] and handed out as a node-link
//! [`GraphSnapshot`] for serialization.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use biograph_core::{
    BiographError, Entity, EntityType, PersonalityRecord, Predicate, Result, ValidatedRelation,
};

pub mod assembler;

pub use assembler::{AssemblyReport, GraphAssembler, MergePolicy, PersonalityConflict};

// ============================================================================
// Graph
// ============================================================================

/// Node payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub entity: Entity,
    pub personality: Option<PersonalityRecord>,
}

impl GraphNode {
    pub fn is_person(&self) -> bool {
        self.entity.entity_type == EntityType::Person
    }
}

/// Directed, predicate-labelled entity graph
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    graph: DiGraph<GraphNode, ValidatedRelation>,
    index: HashMap<String, NodeIndex>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).map(|&idx| &self.graph[idx])
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph.node_weights()
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.nodes().map(|n| &n.entity)
    }

    /// Edges in insertion order
    pub fn relations(&self) -> impl Iterator<Item = &ValidatedRelation> {
        self.graph.edge_weights()
    }

    pub fn personalities(&self) -> impl Iterator<Item = &PersonalityRecord> {
        self.nodes().filter_map(|n| n.personality.as_ref())
    }

    pub fn personality(&self, person_id: &str) -> Option<&PersonalityRecord> {
        self.node(person_id).and_then(|n| n.personality.as_ref())
    }

    /// Outgoing relations of one entity
    pub fn relations_from(&self, id: &str) -> Vec<&ValidatedRelation> {
        match self.index.get(id) {
            Some(&idx) => {
                let mut edges: Vec<_> = self.graph.edges(idx).collect();
                edges.sort_by_key(|e| e.id());
                edges.into_iter().map(|e| e.weight()).collect()
            }
            None => Vec::new(),
        }
    }

    /// Whether the exact `(subject, predicate, object)` edge exists
    pub fn has_relation(&self, subject_id: &str, predicate: Predicate, object_id: &str) -> bool {
        match (self.index.get(subject_id), self.index.get(object_id)) {
            (Some(&s), Some(&o)) => self
                .graph
                .edges_connecting(s, o)
                .any(|e| e.weight().predicate == predicate),
            _ => false,
        }
    }

    pub(crate) fn insert_node(&mut self, entity: Entity) {
        let id = entity.id.clone();
        let idx = self.graph.add_node(GraphNode {
            entity,
            personality: None,
        });
        self.index.insert(id, idx);
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        let idx = *self.index.get(id)?;
        self.graph.node_weight_mut(idx)
    }

    /// Adds the edge; the caller checks endpoints and duplicates first
    pub(crate) fn insert_edge(&mut self, relation: ValidatedRelation) -> Result<()> {
        let source = self.endpoint(&relation.subject_id)?;
        let target = self.endpoint(&relation.object_id)?;
        self.graph.add_edge(source, target, relation);
        Ok(())
    }

    fn endpoint(&self, id: &str) -> Result<NodeIndex> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| BiographError::UnresolvedReference(id.to_string()))
    }

    // ========================================================================
    // Node-link snapshot
    // ========================================================================

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            directed: true,
            nodes: self
                .nodes()
                .map(|n| SnapshotNode {
                    entity: n.entity.clone(),
                    personality: n.personality.clone(),
                })
                .collect(),
            links: self
                .graph
                .edge_references()
                .map(|e| SnapshotLink {
                    source: e.weight().subject_id.clone(),
                    target: e.weight().object_id.clone(),
                    predicate: e.weight().predicate,
                    source_doc_id: e.weight().source_doc_id.clone(),
                })
                .collect(),
        }
    }

    /// Rebuild a graph from a snapshot, rejecting links to unknown nodes
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self> {
        let mut graph = Self::new();
        for node in snapshot.nodes {
            let id = node.entity.id.clone();
            if graph.contains(&id) {
                return Err(BiographError::Json(serde::de::Error::custom(format!(
                    "duplicate node id in snapshot: {id}"
                ))));
            }
            graph.insert_node(node.entity);
            if let Some(n) = graph.node_mut(&id) {
                n.personality = node.personality;
            }
        }
        for link in snapshot.links {
            graph.insert_edge(ValidatedRelation {
                subject_id: link.source,
                predicate: link.predicate,
                object_id: link.target,
                source_doc_id: link.source_doc_id,
            })?;
        }
        Ok(graph)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_snapshot(serde_json::from_str(json)?)
    }
}

/// Node-link form of the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub directed: bool,
    pub nodes: Vec<SnapshotNode>,
    pub links: Vec<SnapshotLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    #[serde(flatten)]
    pub entity: Entity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality: Option<PersonalityRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotLink {
    pub source: String,
    pub target: String,
    pub predicate: Predicate,
    pub source_doc_id: String,
}

//! Graph assembly integration tests

use std::collections::BTreeSet;

use biograph_core::{
    BigFive, DocumentArtifacts, Entity, EntityType, PersonalityConflictPolicy, PersonalityRecord,
    Predicate, ValidatedRelation,
};
use biograph_graph::{GraphAssembler, KnowledgeGraph, MergePolicy};

fn entity(entity_type: EntityType, text: &str, doc: &str) -> Entity {
    Entity {
        id: Entity::derive_id(&entity_type, text),
        surface_text: text.to_string(),
        entity_type,
        source_doc_id: doc.to_string(),
        start: 0,
        end: text.chars().count(),
    }
}

fn relation(s: &Entity, p: Predicate, o: &Entity, doc: &str) -> ValidatedRelation {
    ValidatedRelation {
        subject_id: s.id.clone(),
        predicate: p,
        object_id: o.id.clone(),
        source_doc_id: doc.to_string(),
    }
}

fn personality(person: &Entity, openness: f64, traits: &[&str], doc: &str) -> PersonalityRecord {
    let mut big_five = BigFive::midpoint();
    big_five.openness = openness;
    PersonalityRecord {
        person_id: person.id.clone(),
        big_five,
        traits: traits.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
        source_doc_id: doc.to_string(),
    }
}

fn two_documents() -> (DocumentArtifacts, DocumentArtifacts) {
    let jonas = entity(EntityType::Person, "Jonas Park", "doc_001");
    let orion = entity(EntityType::Org, "Orion Systems", "doc_001");
    let riverton = entity(EntityType::Loc, "Riverton", "doc_002");

    let first = DocumentArtifacts {
        doc_id: "doc_001".into(),
        entities: vec![jonas.clone(), orion.clone()],
        relations: vec![relation(&jonas, Predicate::WorksFor, &orion, "doc_001")],
        personalities: vec![personality(&jonas, 0.8, &["curious"], "doc_001")],
    };
    let second = DocumentArtifacts {
        doc_id: "doc_002".into(),
        entities: vec![
            entity(EntityType::Person, "Jonas Park", "doc_002"),
            riverton.clone(),
        ],
        relations: vec![
            relation(&jonas, Predicate::WorksFor, &orion, "doc_002"),
            relation(&jonas, Predicate::LivesIn, &riverton, "doc_002"),
        ],
        personalities: vec![personality(&jonas, 0.3, &["anxious"], "doc_002")],
    };
    (first, second)
}

fn assemble(policy: MergePolicy, docs: &[&DocumentArtifacts]) -> (KnowledgeGraph, biograph_graph::AssemblyReport) {
    let mut assembler = GraphAssembler::new(policy);
    for doc in docs {
        assembler.add_document(doc);
    }
    assembler.finish()
}

#[test]
fn test_cross_document_merge() {
    let (first, second) = two_documents();
    let (graph, report) = assemble(MergePolicy::default(), &[&first, &second]);

    assert_eq!(report.documents, 2);
    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edge_count(), 2);
    assert_eq!(report.duplicate_nodes, 1);
    assert_eq!(report.duplicate_edges, 1);

    // provenance of the first occurrence survives the merge
    let works_for = graph
        .relations()
        .find(|r| r.predicate == Predicate::WorksFor)
        .unwrap();
    assert_eq!(works_for.source_doc_id, "doc_001");
}

#[test]
fn test_last_write_wins_is_flagged() {
    let (first, second) = two_documents();
    let (graph, report) = assemble(MergePolicy::default(), &[&first, &second]);

    let record = graph.personality("person:jonas_park").unwrap();
    assert_eq!(record.source_doc_id, "doc_002");
    assert_eq!(record.big_five.openness, 0.3);

    assert_eq!(report.personality_conflicts.len(), 1);
    let conflict = &report.personality_conflicts[0];
    assert_eq!(conflict.kept_doc, "doc_002");
    assert_eq!(conflict.discarded_doc, "doc_001");
}

#[test]
fn test_first_write_wins_policy() {
    let (first, second) = two_documents();
    let policy = MergePolicy {
        personality_conflict: PersonalityConflictPolicy::FirstWriteWins,
        ..Default::default()
    };
    let (graph, report) = assemble(policy, &[&first, &second]);

    let record = graph.personality("person:jonas_park").unwrap();
    assert_eq!(record.source_doc_id, "doc_001");
    assert_eq!(report.personality_conflicts[0].kept_doc, "doc_001");
}

#[test]
fn test_identical_personality_is_not_a_conflict() {
    let (first, _) = two_documents();
    let mut again = first.clone();
    again.doc_id = "doc_003".into();
    for record in &mut again.personalities {
        record.source_doc_id = "doc_003".into();
    }

    let (_, report) = assemble(MergePolicy::default(), &[&first, &again]);
    assert!(report.personality_conflicts.is_empty());
}

#[test]
fn test_dangling_edges_skipped() {
    let jonas = entity(EntityType::Person, "Jonas Park", "doc_001");
    let ghost = entity(EntityType::Org, "Ghost Corp", "doc_001");
    let artifacts = DocumentArtifacts {
        doc_id: "doc_001".into(),
        entities: vec![jonas.clone()],
        relations: vec![relation(&jonas, Predicate::WorksFor, &ghost, "doc_001")],
        personalities: vec![],
    };

    let (graph, report) = assemble(MergePolicy::default(), &[&artifacts]);
    assert_eq!(graph.edge_count(), 0);
    assert_eq!(report.dangling_edges, 1);
}

#[test]
fn test_assembly_is_deterministic_for_fixed_order() {
    let (first, second) = two_documents();
    let (a, _) = assemble(MergePolicy::default(), &[&first, &second]);
    let (b, _) = assemble(MergePolicy::default(), &[&first, &second]);
    assert_eq!(a.snapshot(), b.snapshot());
}

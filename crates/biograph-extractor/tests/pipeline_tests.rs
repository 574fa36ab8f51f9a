//! Pipeline integration tests
//!
//! The LLM and NER collaborators are scripted: responses are chosen by
//! looking at the prompt, so every test is deterministic and offline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use biograph_core::{
    BiographError, Document, EntityRecognizer, EntitySpan, GroundTruthRecord, LlmClient,
    Predicate, Result, SchemaConfig,
};
use biograph_extractor::{
    Category, DocumentExtractor, Evaluator, GazetteerEntry, GazetteerNer, Pipeline, RetryPolicy,
};
use biograph_graph::MergePolicy;

// =============================================================================
// Scripted collaborators
// =============================================================================

type Script = dyn Fn(&str) -> Result<String> + Send + Sync;

struct ScriptedLlm {
    script: Box<Script>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(script: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(prompt)
    }
}

/// Fails on any text containing "UNREADABLE"
struct FlakyNer(GazetteerNer);

impl EntityRecognizer for FlakyNer {
    fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>> {
        if text.contains("UNREADABLE") {
            return Err(BiographError::Ner("model unavailable".to_string()));
        }
        self.0.recognize(text)
    }
}

fn gazetteer() -> GazetteerNer {
    GazetteerNer::from_entries(&[
        GazetteerEntry::new("Jonas Park", "PERSON"),
        GazetteerEntry::new("Maya Rivers", "PERSON"),
        GazetteerEntry::new("Orion Systems", "ORG"),
        GazetteerEntry::new("Northbridge University", "ORG"),
        GazetteerEntry::new("Riverton", "GPE"),
    ])
    .unwrap()
}

fn personality_for(prompt: &str) -> String {
    if prompt.contains("traits of Jonas Park") {
        json!({
            "big_five": {"openness": 0.8, "conscientiousness": 0.5, "extraversion": 0.2,
                         "agreeableness": 0.5, "neuroticism": 0.2},
            "traits": ["curious", "resilient", "grumpy"]
        })
        .to_string()
    } else {
        json!({
            "big_five": {"O": 0.4, "C": 0.9, "E": 0.7, "A": 0.6},
            "traits": ["organized", "sociable"]
        })
        .to_string()
    }
}

fn relations_for(prompt: &str) -> String {
    if prompt.contains("\"\"\"Jonas Park is employed by Orion Systems.") {
        json!({"relations": [
            {"subject": "Jonas Park", "predicate": "is employed by", "object": "Orion Systems"},
            {"subject": "He", "predicate": "works_for", "object": "Orion Systems"}
        ]})
        .to_string()
    } else if prompt.contains("\"\"\"He lives in Riverton.") {
        format!(
            "Here are the triples:\n{}",
            json!({"relations": [
                {"subject": "Jonas Park", "predicate": "lives_in", "object": "Riverton"},
                {"subject": "Orion Systems", "predicate": "lives_in", "object": "Riverton"}
            ]})
        )
    } else if prompt.contains("Maya Rivers studied") {
        json!({"relations": [
            {"subject": "Maya Rivers", "predicate": "studied_at", "object": "Northbridge University"},
            {"subject": "Maya Rivers", "predicate": "likes", "object": "Riverton"},
            {"subject": "Maya Rivers", "predicate": "collaborates with", "object": "Jonas Park"}
        ]})
        .to_string()
    } else {
        json!({"relations": []}).to_string()
    }
}

fn corpus() -> Vec<Document> {
    vec![
        Document::new(
            "doc_002",
            "Maya Rivers studied at Northbridge University and collaborates with Jonas Park.",
        ),
        Document::new(
            "doc_001",
            "Jonas Park is employed by Orion Systems. He lives in Riverton.",
        )
        .with_sentences(vec![
            "Jonas Park is employed by Orion Systems.".to_string(),
            "He lives in Riverton.".to_string(),
        ]),
    ]
}

fn pipeline(llm: Arc<dyn LlmClient>, ner: Arc<dyn EntityRecognizer>) -> Pipeline {
    let extractor = DocumentExtractor::new(Arc::new(SchemaConfig::default()), llm, ner)
        .with_retry(RetryPolicy::new(2, 0, 0));
    Pipeline::new(extractor, MergePolicy::default())
}

fn well_behaved_llm() -> Arc<ScriptedLlm> {
    ScriptedLlm::new(|prompt| {
        if prompt.contains("personality analysis") {
            Ok(personality_for(prompt))
        } else {
            Ok(relations_for(prompt))
        }
    })
}

// =============================================================================
// End to end
// =============================================================================

#[tokio::test]
async fn test_end_to_end_run() {
    let outcome = pipeline(well_behaved_llm(), Arc::new(gazetteer()))
        .run(corpus())
        .await;

    let ids: Vec<_> = outcome.documents.iter().map(|d| d.doc_id.as_str()).collect();
    assert_eq!(ids, vec!["doc_001", "doc_002"]);
    assert_eq!(outcome.failed().count(), 0);

    let graph = &outcome.graph;
    assert_eq!(graph.node_count(), 5);
    assert!(graph.has_relation("person:jonas_park", Predicate::WorksFor, "org:orion_systems"));
    assert!(graph.has_relation("person:jonas_park", Predicate::LivesIn, "loc:riverton"));
    assert!(graph.has_relation(
        "person:maya_rivers",
        Predicate::StudiedAt,
        "org:northbridge_university"
    ));
    assert!(graph.has_relation(
        "person:maya_rivers",
        Predicate::CollaboratesWith,
        "person:jonas_park"
    ));
    assert_eq!(graph.edge_count(), 4);

    let doc_001 = &outcome.documents[0];
    assert_eq!(doc_001.discarded.unresolved_reference, 1);
    assert_eq!(doc_001.discarded.type_constraint_violation, 1);
    assert_eq!(outcome.documents[1].discarded.schema_violation, 1);

    // Jonas appears in both documents with identical inferences: the later
    // record is kept and no conflict is reported
    let jonas = graph.personality("person:jonas_park").unwrap();
    assert_eq!(jonas.source_doc_id, "doc_002");
    assert!(outcome.assembly.personality_conflicts.is_empty());

    let maya = graph.personality("person:maya_rivers").unwrap();
    assert_eq!(maya.big_five.neuroticism, 0.5);
    for record in graph.personalities() {
        assert!(record.big_five.in_range());
    }
}

#[tokio::test]
async fn test_pronoun_candidate_never_reaches_graph() {
    let outcome = pipeline(well_behaved_llm(), Arc::new(gazetteer()))
        .run(corpus())
        .await;

    let from_doc_001: Vec<_> = outcome
        .graph
        .relations()
        .filter(|r| r.source_doc_id == "doc_001")
        .collect();
    assert_eq!(from_doc_001.len(), 2);
    assert!(from_doc_001.iter().all(|r| r.subject_id == "person:jonas_park"));
    assert!(outcome.graph.node("person:he").is_none());
}

#[tokio::test]
async fn test_evaluation_against_ground_truth() {
    let outcome = pipeline(well_behaved_llm(), Arc::new(gazetteer()))
        .run(corpus())
        .await;

    let truth = GroundTruthRecord::from_json_str(
        &json!({
            "entities": [
                {"id": "p001", "type": "PERSON", "name": "Jonas Park"},
                {"id": "p002", "type": "PERSON", "name": "Maya Rivers"},
                {"id": "o001", "type": "ORG", "name": "Orion Systems"},
                {"id": "u001", "type": "ORG", "name": "Northbridge University"},
                {"id": "l001", "type": "LOC", "name": "Riverton"}
            ],
            "relations": [
                ["p001", "works_for", "o001"],
                ["p001", "lives_in", "l001"],
                ["p002", "studied_at", "u001"],
                ["p002", "reports_to", "p001"]
            ],
            "personality": {
                "p002": {"big_five": {"openness": 0.4, "conscientiousness": 0.9, "extraversion": 0.7,
                                      "agreeableness": 0.6, "neuroticism": 0.5},
                         "traits": ["organized", "sociable"]}
            }
        })
        .to_string(),
    )
    .unwrap()
    .canonicalize();

    let report = Evaluator::new().evaluate(&outcome.graph, &truth);
    assert_eq!(report.entity.precision, 1.0);
    assert_eq!(report.entity.recall, 1.0);
    assert_eq!(report.relation_counts.true_positives, 3);
    assert_eq!(report.relation.precision, 0.75);
    assert_eq!(report.relation.recall, 0.75);
    assert_eq!(report.personality.mae, Some(0.0));
    assert_eq!(report.personality.jaccard, Some(1.0));
    assert_eq!(report.personality.persons_excluded, 1);
}

// =============================================================================
// Degradation
// =============================================================================

#[tokio::test]
async fn test_ner_failure_skips_only_that_document() {
    let mut docs = corpus();
    docs.push(Document::new("doc_003", "UNREADABLE scan of Jonas Park"));

    let ner = Arc::new(FlakyNer(gazetteer()));
    let outcome = pipeline(well_behaved_llm(), ner).run(docs).await;

    let failed: Vec<_> = outcome.failed().map(|d| d.doc_id.as_str()).collect();
    assert_eq!(failed, vec!["doc_003"]);
    assert_eq!(outcome.documents.len(), 3);
    assert_eq!(outcome.graph.edge_count(), 4);
}

#[tokio::test]
async fn test_unparseable_relation_output_degrades_category() {
    let llm = ScriptedLlm::new(|prompt| {
        if prompt.contains("personality analysis") {
            Ok(personality_for(prompt))
        } else {
            Ok("I'm sorry, I can't do that.".to_string())
        }
    });

    let outcome = pipeline(llm.clone(), Arc::new(gazetteer()))
        .run(corpus())
        .await;

    assert_eq!(outcome.graph.edge_count(), 0);
    assert_eq!(outcome.graph.node_count(), 5);
    assert_eq!(outcome.graph.personalities().count(), 2);
    for status in &outcome.documents {
        assert!(!status.is_failed());
        assert_eq!(status.degraded, vec![Category::Relations]);
    }
    // doc_001 gives up after its first sentence: 2 attempts; doc_002: 2 attempts;
    // plus one personality call per person mention (Jonas twice, Maya once)
    assert_eq!(llm.calls(), 2 + 2 + 3);
}

#[tokio::test]
async fn test_error_object_reply_degrades_both_categories() {
    let llm = ScriptedLlm::new(|_| Ok(json!({"error": "model overloaded"}).to_string()));

    let outcome = pipeline(llm.clone(), Arc::new(gazetteer()))
        .run(corpus())
        .await;

    assert_eq!(outcome.graph.node_count(), 5);
    assert_eq!(outcome.graph.edge_count(), 0);
    assert_eq!(outcome.graph.personalities().count(), 0);
    assert!(outcome.graph.personality("person:jonas_park").is_none());
    for status in &outcome.documents {
        assert!(!status.is_failed());
        assert_eq!(
            status.degraded,
            vec![Category::Relations, Category::Personality]
        );
        assert_eq!(status.relations, 0);
        assert_eq!(status.personalities, 0);
    }
    // relations are retried (2 attempts per document), personality
    // replies of the wrong shape are malformed and not retried
    assert_eq!(llm.calls(), 2 + 2 + 3);
}

#[tokio::test]
async fn test_transient_llm_error_is_retried() {
    let failures = Arc::new(AtomicUsize::new(0));
    let counter = failures.clone();
    let llm = ScriptedLlm::new(move |prompt| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(BiographError::Llm("connection reset".to_string()));
        }
        if prompt.contains("personality analysis") {
            Ok(personality_for(prompt))
        } else {
            Ok(relations_for(prompt))
        }
    });

    let outcome = pipeline(llm, Arc::new(gazetteer())).run(corpus()).await;
    assert!(outcome.documents.iter().all(|d| !d.is_degraded()));
    assert_eq!(outcome.graph.edge_count(), 4);
}

#[tokio::test]
async fn test_malformed_personality_skips_person() {
    let llm = ScriptedLlm::new(|prompt| {
        if prompt.contains("traits of Maya Rivers") {
            Ok(json!({"big_five": {"openness": "very high"}}).to_string())
        } else if prompt.contains("personality analysis") {
            Ok(personality_for(prompt))
        } else {
            Ok(relations_for(prompt))
        }
    });

    let outcome = pipeline(llm, Arc::new(gazetteer())).run(corpus()).await;
    let doc_002 = &outcome.documents[1];
    assert_eq!(doc_002.degraded, vec![Category::Personality]);
    assert_eq!(doc_002.skipped_persons, vec!["person:maya_rivers".to_string()]);
    assert!(outcome.graph.personality("person:maya_rivers").is_none());
    assert!(outcome.graph.personality("person:jonas_park").is_some());
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
async fn test_concurrency_does_not_change_result() {
    let sequential = pipeline(well_behaved_llm(), Arc::new(gazetteer()))
        .run(corpus())
        .await;
    let concurrent = pipeline(well_behaved_llm(), Arc::new(gazetteer()))
        .with_concurrency(4)
        .run(corpus())
        .await;

    assert_eq!(sequential.graph.snapshot(), concurrent.graph.snapshot());
    assert_eq!(sequential.documents, concurrent.documents);
}

#[tokio::test]
async fn test_precomputed_spans_bypass_recognizer() {
    let ner = Arc::new(FlakyNer(GazetteerNer::new()));
    let doc = Document::new("doc_009", "UNREADABLE, but Jonas Park works for Orion Systems.")
        .with_entities(vec![
            EntitySpan::new("Jonas Park", "PERSON", 16, 26),
            EntitySpan::new("Orion Systems", "ORG", 37, 50),
        ]);

    let outcome = pipeline(well_behaved_llm(), ner).run(vec![doc]).await;
    assert_eq!(outcome.failed().count(), 0);
    assert_eq!(outcome.graph.node_count(), 2);
}

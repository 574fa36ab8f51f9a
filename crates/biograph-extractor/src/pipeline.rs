//! Extraction pipeline
//!
//! `DocumentExtractor` runs NER, relation and personality extraction for a
//! single document and validates every collaborator response. `Pipeline`
//! drives a whole corpus: documents are extracted (optionally several at a
//! time) and folded into the graph one by one in ascending id order.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use biograph_core::{
    AppConfig, BiographError, Document, DocumentArtifacts, EntityRecognizer, EntitySpan,
    LlmClient, Result, SchemaConfig,
};
use biograph_graph::{AssemblyReport, GraphAssembler, KnowledgeGraph, MergePolicy};

use crate::{
    extract_json, parse_candidates, DiscardCounts, EntityIndex, PersonalityPrompt,
    PersonalityReconciler, PrecomputedSpans, RelationFilter, RelationPrompt, ResolutionConflict,
    RetryPolicy,
};

// ============================================================================
// Status
// ============================================================================

/// Extraction category that can degrade independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Entities,
    Relations,
    Personality,
}

/// Per-document outcome reported after a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentStatus {
    pub doc_id: String,
    /// Set when the document was skipped entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<Category>,
    pub entities: usize,
    pub relations: usize,
    pub personalities: usize,
    pub discarded: DiscardCounts,
    pub duplicate_relations: usize,
    pub resolution_conflicts: usize,
    pub personality_warnings: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_persons: Vec<String>,
}

impl DocumentStatus {
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            ..Default::default()
        }
    }

    pub fn failed(doc_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            failed: Some(reason.into()),
            ..Self::new(doc_id)
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed.is_some()
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    fn degrade(&mut self, category: Category) {
        if !self.degraded.contains(&category) {
            self.degraded.push(category);
        }
    }
}

/// Validated output of one document plus its status
#[derive(Debug, Clone)]
pub struct DocumentExtraction {
    pub artifacts: DocumentArtifacts,
    pub status: DocumentStatus,
    pub conflicts: Vec<ResolutionConflict>,
}

// ============================================================================
// Document Extractor
// ============================================================================

/// Runs and validates all collaborator calls for one document
pub struct DocumentExtractor {
    llm: Arc<dyn LlmClient>,
    ner: Arc<dyn EntityRecognizer>,
    filter: RelationFilter,
    reconciler: PersonalityReconciler,
    relation_prompt: RelationPrompt,
    personality_prompt: PersonalityPrompt,
    retry: RetryPolicy,
    per_sentence: bool,
}

impl DocumentExtractor {
    pub fn new(
        schema: Arc<SchemaConfig>,
        llm: Arc<dyn LlmClient>,
        ner: Arc<dyn EntityRecognizer>,
    ) -> Self {
        Self {
            llm,
            ner,
            filter: RelationFilter::new(schema.clone()),
            reconciler: PersonalityReconciler::new(schema.clone()),
            relation_prompt: RelationPrompt::new(schema.clone()),
            personality_prompt: PersonalityPrompt::new(schema),
            retry: RetryPolicy::default(),
            per_sentence: true,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        llm: Arc<dyn LlmClient>,
        ner: Arc<dyn EntityRecognizer>,
    ) -> Self {
        Self::new(Arc::new(config.schema.clone()), llm, ner)
            .with_retry(RetryPolicy::from_config(&config.retry))
            .with_per_sentence_relations(config.pipeline.per_sentence_relations)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Prompt once per sentence when the document carries sentences
    pub fn with_per_sentence_relations(mut self, enabled: bool) -> Self {
        self.per_sentence = enabled;
        self
    }

    /// Extract one document.
    ///
    /// Only an NER failure fails the document. Relation and personality
    /// failures degrade their category and are reported in the status.
    pub async fn extract(&self, doc: &Document) -> Result<DocumentExtraction> {
        let mut status = DocumentStatus::new(&doc.id);

        let spans = self.recognize(doc).await?;
        let index = EntityIndex::build(&doc.id, &spans);
        status.entities = index.len();
        status.resolution_conflicts = index.conflicts().len();
        if !index.conflicts().is_empty() {
            status.degrade(Category::Entities);
        }

        let relations = match self.extract_relations(doc, &index).await {
            Ok(outcome) => {
                status.discarded = outcome.discarded;
                status.duplicate_relations = outcome.duplicates;
                outcome.relations
            }
            Err(e) => {
                warn!(doc_id = %doc.id, error = %e, "relation extraction failed, category degraded");
                status.degrade(Category::Relations);
                Vec::new()
            }
        };
        status.relations = relations.len();

        let mut personalities = Vec::new();
        for person in index.persons() {
            let prompt = self.personality_prompt.build(&person.surface_text, &doc.text);
            let reconciled = self
                .retry
                .retry("personality", || self.generate_json(&prompt))
                .await
                .and_then(|raw| self.reconciler.reconcile(&person.id, &doc.id, &raw));

            match reconciled {
                Ok(reconciled) => {
                    status.personality_warnings += reconciled.warnings.len();
                    personalities.push(reconciled.record);
                }
                Err(e) => {
                    warn!(
                        doc_id = %doc.id,
                        person_id = %person.id,
                        error = %e,
                        "skipping personality record"
                    );
                    status.degrade(Category::Personality);
                    status.skipped_persons.push(person.id.clone());
                }
            }
        }
        status.personalities = personalities.len();

        info!(
            doc_id = %doc.id,
            entities = status.entities,
            relations = status.relations,
            discarded = status.discarded.total(),
            personalities = status.personalities,
            degraded = ?status.degraded,
            "document extracted"
        );

        let conflicts = index.conflicts().to_vec();
        Ok(DocumentExtraction {
            artifacts: DocumentArtifacts {
                doc_id: doc.id.clone(),
                entities: index.into_entities(),
                relations,
                personalities,
            },
            status,
            conflicts,
        })
    }

    async fn recognize(&self, doc: &Document) -> Result<Vec<EntitySpan>> {
        match &doc.entities {
            Some(spans) => PrecomputedSpans::new(spans.clone()).recognize(&doc.text),
            None => {
                self.retry
                    .retry("ner", || async { self.ner.recognize(&doc.text) })
                    .await
            }
        }
    }

    async fn extract_relations(
        &self,
        doc: &Document,
        index: &EntityIndex,
    ) -> Result<crate::FilterOutcome> {
        if index.is_empty() {
            debug!(doc_id = %doc.id, "no entities, skipping relation extraction");
            return Ok(Default::default());
        }

        let units: Vec<&str> = if self.per_sentence && !doc.sentences.is_empty() {
            doc.sentences.iter().map(String::as_str).collect()
        } else {
            vec![doc.text.as_str()]
        };

        let mut candidates = Vec::new();
        for unit in units {
            let prompt = self.relation_prompt.build(unit, index.entities());
            let parsed = self
                .retry
                .retry("relations", || async {
                    let raw = self.generate_json(&prompt).await?;
                    parse_candidates(&doc.id, &raw)
                })
                .await?;
            candidates.extend(parsed);
        }

        Ok(self.filter.filter(index, &candidates))
    }

    /// One LLM call; text without a JSON payload counts as a transient failure
    async fn generate_json(&self, prompt: &str) -> Result<Value> {
        let raw = self.llm.generate(prompt).await?;
        extract_json(&raw)
            .ok_or_else(|| BiographError::Llm("response contained no JSON payload".to_string()))
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Result of a full run
#[derive(Debug)]
pub struct RunOutcome {
    pub graph: KnowledgeGraph,
    pub assembly: AssemblyReport,
    pub documents: Vec<DocumentStatus>,
}

impl RunOutcome {
    pub fn failed(&self) -> impl Iterator<Item = &DocumentStatus> {
        self.documents.iter().filter(|d| d.is_failed())
    }

    pub fn degraded(&self) -> impl Iterator<Item = &DocumentStatus> {
        self.documents.iter().filter(|d| d.is_degraded())
    }
}

/// Corpus driver with a single-writer assembly fold
pub struct Pipeline {
    extractor: DocumentExtractor,
    policy: MergePolicy,
    concurrency: usize,
}

impl Pipeline {
    pub fn new(extractor: DocumentExtractor, policy: MergePolicy) -> Self {
        Self {
            extractor,
            policy,
            concurrency: 1,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        llm: Arc<dyn LlmClient>,
        ner: Arc<dyn EntityRecognizer>,
    ) -> Self {
        Self::new(
            DocumentExtractor::from_config(config, llm, ner),
            MergePolicy::from_config(&config.pipeline),
        )
        .with_concurrency(config.pipeline.concurrency)
    }

    /// Documents extracted at once; results are still folded in id order
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn run(&self, mut documents: Vec<Document>) -> RunOutcome {
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        info!(
            documents = documents.len(),
            concurrency = self.concurrency,
            "starting extraction run"
        );

        let mut assembler = GraphAssembler::new(self.policy);
        let mut statuses = Vec::with_capacity(documents.len());

        // `buffered` yields in input order, keeping the fold deterministic
        let mut results = stream::iter(documents.iter())
            .map(|doc| async move { (doc.id.as_str(), self.extractor.extract(doc).await) })
            .buffered(self.concurrency);

        while let Some((doc_id, result)) = results.next().await {
            match result {
                Ok(extraction) => {
                    assembler.add_document(&extraction.artifacts);
                    statuses.push(extraction.status);
                }
                Err(e) => {
                    warn!(doc_id, error = %e, "document failed, skipping");
                    statuses.push(DocumentStatus::failed(doc_id, e.to_string()));
                }
            }
        }

        let (graph, assembly) = assembler.finish();
        let outcome = RunOutcome {
            graph,
            assembly,
            documents: statuses,
        };

        info!(
            documents = outcome.documents.len(),
            failed = outcome.failed().count(),
            degraded = outcome.degraded().count(),
            nodes = outcome.graph.node_count(),
            edges = outcome.graph.edge_count(),
            "extraction run complete"
        );
        outcome
    }
}

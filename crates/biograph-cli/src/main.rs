//! Biograph CLI
//!
//! Command line interface for building and evaluating a biographical
//! knowledge graph.
//!
//! Author: hephaex@gmail.com

mod corpus;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use biograph_core::{AppConfig, EntityRecognizer, GroundTruthRecord, LlmClient, LoggingConfig};
use biograph_extractor::{DocumentStatus, Evaluator, GazetteerNer, MetricsReport, Pipeline};
use biograph_graph::{AssemblyReport, KnowledgeGraph};
use biograph_llm::create_llm_client;

#[derive(Parser)]
#[command(name = "biograph")]
#[command(about = "Biographical knowledge graph extraction", version)]
struct Cli {
    /// TOML configuration file (environment variables take precedence)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a corpus into a knowledge graph
    Run {
        /// JSON file with an array of documents, or a directory of .txt files
        #[arg(long)]
        corpus: PathBuf,

        /// Ground truth record; enables metrics.json
        #[arg(long)]
        ground_truth: Option<PathBuf>,

        /// Gazetteer (JSON array of {term, label, aliases}) for the NER stand-in
        #[arg(long)]
        gazetteer: Option<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = "outputs")]
        out: PathBuf,
    },

    /// Score a saved graph against ground truth
    Evaluate {
        /// graph.json written by `run`
        #[arg(long)]
        predicted: PathBuf,

        #[arg(long)]
        ground_truth: PathBuf,

        /// Match entities by normalized text only, ignoring type
        #[arg(long)]
        ignore_types: bool,
    },

    /// Print the active extraction schema
    Schema,
}

/// Run metadata written next to the graph
#[derive(Serialize)]
struct RunSummary<'a> {
    run_id: Uuid,
    generated_at: DateTime<Utc>,
    nodes: usize,
    edges: usize,
    assembly: &'a AssemblyReport,
    documents: &'a [DocumentStatus],
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json || logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

fn load_ground_truth(path: &Path) -> Result<GroundTruthRecord> {
    let record = GroundTruthRecord::from_path(path)
        .with_context(|| format!("Failed to load ground truth {}", path.display()))?;
    Ok(record.canonicalize())
}

fn build_ner(gazetteer: Option<&Path>) -> Result<GazetteerNer> {
    let ner = match gazetteer {
        Some(path) => GazetteerNer::from_path(path)
            .with_context(|| format!("Failed to load gazetteer {}", path.display()))?,
        None => GazetteerNer::new(),
    };
    Ok(ner.with_default_patterns())
}

async fn run(
    config: &AppConfig,
    corpus_path: &Path,
    ground_truth: Option<&Path>,
    gazetteer: Option<&Path>,
    out: &Path,
) -> Result<()> {
    let documents = corpus::load_corpus(corpus_path)?;
    let truth = ground_truth.map(load_ground_truth).transpose()?;

    let llm: Arc<dyn LlmClient> =
        Arc::from(create_llm_client(&config.llm).context("Failed to create LLM client")?);
    let ner: Arc<dyn EntityRecognizer> = Arc::new(build_ner(gazetteer)?);
    let pipeline = Pipeline::from_config(config, llm, ner);

    let outcome = pipeline.run(documents).await;

    std::fs::create_dir_all(out)
        .with_context(|| format!("Failed to create output directory {}", out.display()))?;

    let graph_path = out.join("graph.json");
    std::fs::write(&graph_path, outcome.graph.to_json()?)
        .with_context(|| format!("Failed to write {}", graph_path.display()))?;

    let summary = RunSummary {
        run_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        nodes: outcome.graph.node_count(),
        edges: outcome.graph.edge_count(),
        assembly: &outcome.assembly,
        documents: &outcome.documents,
    };
    write_json(&out.join("run.json"), &summary)?;

    println!("Run {}", summary.run_id);
    println!(
        "  Documents: {} ({} failed, {} degraded)",
        outcome.documents.len(),
        outcome.failed().count(),
        outcome.degraded().count()
    );
    println!("  Nodes: {}", summary.nodes);
    println!("  Edges: {}", summary.edges);
    println!(
        "  Personality conflicts: {}",
        outcome.assembly.personality_conflicts.len()
    );
    for status in outcome.failed() {
        println!(
            "  FAILED {}: {}",
            status.doc_id,
            status.failed.as_deref().unwrap_or_default()
        );
    }

    if let Some(truth) = truth {
        let report = Evaluator::new().evaluate(&outcome.graph, &truth);
        write_json(&out.join("metrics.json"), &report)?;
        println!();
        print!("{}", report.render());
    }

    info!(out = %out.display(), "outputs written");
    Ok(())
}

fn evaluate(predicted: &Path, ground_truth: &Path, ignore_types: bool) -> Result<MetricsReport> {
    let json = std::fs::read_to_string(predicted)
        .with_context(|| format!("Failed to read {}", predicted.display()))?;
    let graph = KnowledgeGraph::from_json(&json)
        .with_context(|| format!("Failed to parse graph {}", predicted.display()))?;
    let truth = load_ground_truth(ground_truth)?;

    Ok(Evaluator::new()
        .with_type_matching(!ignore_types)
        .evaluate(&graph, &truth))
}

fn print_schema(config: &AppConfig) {
    let schema = &config.schema;

    println!("Predicates:");
    for line in schema.describe_constraints() {
        println!("  {line}");
    }

    println!("\nPredicate aliases:");
    for (alias, predicate) in &schema.predicate_aliases {
        println!("  {alias} -> {predicate}");
    }

    println!("\nTrait vocabulary:");
    println!(
        "  {}",
        schema
            .vocabulary
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.logging, cli.json_logs);

    match cli.command {
        Commands::Run {
            corpus,
            ground_truth,
            gazetteer,
            out,
        } => {
            run(
                &config,
                &corpus,
                ground_truth.as_deref(),
                gazetteer.as_deref(),
                &out,
            )
            .await?;
        }

        Commands::Evaluate {
            predicted,
            ground_truth,
            ignore_types,
        } => {
            let report = evaluate(&predicted, &ground_truth, ignore_types)?;
            print!("{}", report.render());
        }

        Commands::Schema => print_schema(&config),
    }

    Ok(())
}

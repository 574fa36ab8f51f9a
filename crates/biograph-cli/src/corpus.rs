//! Corpus loading
//!
//! Two layouts are accepted: a JSON file holding an array of documents, or a
//! directory of `.txt` files. A directory may carry an `entities.json` with
//! precomputed spans and sentences keyed by file name.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use biograph_core::{Document, EntitySpan};

/// File holding precomputed NER output inside a corpus directory
pub const PREPROCESSED_FILE: &str = "entities.json";

#[derive(Debug, Deserialize)]
struct Preprocessed {
    #[serde(default)]
    entities: Vec<EntitySpan>,
    #[serde(default)]
    sentences: Vec<String>,
}

/// Load documents from a JSON file or a directory of text files
pub fn load_corpus(path: &Path) -> Result<Vec<Document>> {
    let mut documents = if path.is_dir() {
        load_directory(path)?
    } else {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read corpus file {}", path.display()))?;
        serde_json::from_str::<Vec<Document>>(&content)
            .with_context(|| format!("Failed to parse corpus file {}", path.display()))?
    };

    documents.sort_by(|a, b| a.id.cmp(&b.id));
    info!(path = %path.display(), documents = documents.len(), "corpus loaded");
    Ok(documents)
}

fn load_directory(dir: &Path) -> Result<Vec<Document>> {
    let preprocessed = load_preprocessed(&dir.join(PREPROCESSED_FILE))?;

    let mut files: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list corpus directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    files.sort();

    let mut documents = Vec::with_capacity(files.len());
    for file in files {
        let Some(stem) = file.file_stem().and_then(|s| s.to_str()) else {
            warn!(path = %file.display(), "skipping file with a non UTF-8 name");
            continue;
        };
        let text = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read {}", file.display()))?;

        let mut document = Document::new(stem, text.trim());
        let file_name = format!("{stem}.txt");
        if let Some(pre) = preprocessed
            .get(&file_name)
            .or_else(|| preprocessed.get(stem))
        {
            debug!(doc_id = stem, spans = pre.entities.len(), "using precomputed spans");
            document = document
                .with_sentences(pre.sentences.clone())
                .with_entities(pre.entities.clone());
        }
        documents.push(document);
    }

    Ok(documents)
}

fn load_preprocessed(path: &Path) -> Result<HashMap<String, Preprocessed>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        std::fs::write(
            &path,
            r#"[
                {"id": "doc_002", "text": "Maya Rivers lives in Riverton."},
                {"id": "doc_001", "text": "Jonas Park works at Orion Systems.",
                 "sentences": ["Jonas Park works at Orion Systems."]}
            ]"#,
        )
        .unwrap();

        let docs = load_corpus(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "doc_001");
        assert_eq!(docs[0].sentences.len(), 1);
        assert!(docs[1].entities.is_none());
    }

    #[test]
    fn test_load_directory_with_preprocessed_spans() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("doc_001.txt"), "Jonas Park works at Orion Systems.\n").unwrap();
        std::fs::write(dir.path().join("doc_002.txt"), "Maya Rivers lives in Riverton.").unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();
        std::fs::write(
            dir.path().join(PREPROCESSED_FILE),
            r#"{
                "doc_001.txt": {
                    "entities": [
                        {"text": "Jonas Park", "label": "PERSON", "start": 0, "end": 10},
                        {"text": "Orion Systems", "label": "ORG", "start": 20, "end": 33}
                    ],
                    "sentences": ["Jonas Park works at Orion Systems."]
                }
            }"#,
        )
        .unwrap();

        let docs = load_corpus(dir.path()).unwrap();
        assert_eq!(docs.len(), 2);

        assert_eq!(docs[0].id, "doc_001");
        assert_eq!(docs[0].text, "Jonas Park works at Orion Systems.");
        assert_eq!(docs[0].entities.as_ref().map(Vec::len), Some(2));
        assert_eq!(docs[0].sentences.len(), 1);

        assert_eq!(docs[1].id, "doc_002");
        assert!(docs[1].entities.is_none());
    }

    #[test]
    fn test_preprocessed_keyed_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("doc_007.txt"), "Noah Cole.").unwrap();
        std::fs::write(
            dir.path().join(PREPROCESSED_FILE),
            r#"{"doc_007": {"entities": [{"text": "Noah Cole", "label": "PERSON", "start": 0, "end": 9}]}}"#,
        )
        .unwrap();

        let docs = load_corpus(dir.path()).unwrap();
        assert_eq!(docs[0].entities.as_ref().unwrap()[0].text, "Noah Cole");
    }

    #[test]
    fn test_missing_corpus_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_corpus(&dir.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read corpus file"));
    }
}

//! Named Entity Recognition adapters
//!
//! The NER model itself is an external collaborator. This module provides
//! two stand-ins behind [`EntityRecognizer`]:
//! - `GazetteerNer`: dictionary + alias lookup, with optional regex patterns
//! - `PrecomputedSpans`: spans shipped alongside the corpus

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use biograph_core::{BiographError, EntityRecognizer, EntitySpan, Result};

// ============================================================================
// Gazetteer NER
// ============================================================================

/// Dictionary entry for entity matching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazetteerEntry {
    pub term: String,
    pub label: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl GazetteerEntry {
    pub fn new(term: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            label: label.into(),
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|s| s.to_string()).collect();
        self
    }
}

struct Rule {
    regex: Regex,
    label: String,
    confidence: f32,
}

#[derive(Debug, Clone)]
struct Candidate {
    span: EntitySpan,
    byte_start: usize,
    byte_end: usize,
    confidence: f32,
}

static ORG_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:[A-Z][A-Za-z&'-]*\s+){1,3}(?:University|Institute of Technology|College|Polytechnic|Labs|Systems|Analytics|Dynamics)\b",
    )
    .expect("valid regex")
});

static ORG_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:University|Institute) of [A-Z][A-Za-z]+(?:\s+[A-Z][A-Za-z]+)?")
        .expect("valid regex")
});

static HONORIFIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:Dr|Prof|Mr|Mrs|Ms)\.?\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)")
        .expect("valid regex")
});

/// Capitalized function words a pattern may swallow at sentence start
const LEADING_STOPWORDS: &[&str] = &[
    "A", "An", "And", "As", "At", "By", "For", "From", "In", "Joined", "Of", "On", "The", "To",
    "With",
];

/// Dictionary-driven NER with optional ORG/PERSON surface patterns
pub struct GazetteerNer {
    terms: Vec<Rule>,
    patterns: bool,
}

impl GazetteerNer {
    /// Empty gazetteer; patterns disabled
    pub fn new() -> Self {
        Self {
            terms: Vec::new(),
            patterns: false,
        }
    }

    pub fn from_entries(entries: &[GazetteerEntry]) -> Result<Self> {
        let mut ner = Self::new();
        for entry in entries {
            let aliases: Vec<&str> = entry.aliases.iter().map(String::as_str).collect();
            ner.add_term(&entry.term, &entry.label, &aliases)?;
        }
        Ok(ner)
    }

    /// Load a JSON array of [`GazetteerEntry`]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let entries: Vec<GazetteerEntry> = serde_json::from_str(&content)?;
        Self::from_entries(&entries)
    }

    /// Also match organisation suffixes ("... University", "... Systems")
    /// and honorific-prefixed person names
    pub fn with_default_patterns(mut self) -> Self {
        self.patterns = true;
        self
    }

    /// Add a dictionary term and its aliases
    pub fn add_term(&mut self, term: &str, label: &str, aliases: &[&str]) -> Result<()> {
        self.push_rule(term, label, 0.95)?;
        for alias in aliases {
            self.push_rule(alias, label, 0.9)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    fn push_rule(&mut self, surface: &str, label: &str, confidence: f32) -> Result<()> {
        let surface = surface.trim();
        if surface.is_empty() {
            return Ok(());
        }

        let mut pattern = String::from("(?i)");
        if surface.starts_with(|c: char| c.is_alphanumeric()) {
            pattern.push_str(r"\b");
        }
        pattern.push_str(&regex::escape(surface));
        if surface.ends_with(|c: char| c.is_alphanumeric()) {
            pattern.push_str(r"\b");
        }

        let regex = Regex::new(&pattern)
            .map_err(|e| BiographError::Ner(format!("invalid gazetteer term '{surface}': {e}")))?;
        self.terms.push(Rule {
            regex,
            label: label.to_uppercase(),
            confidence,
        });
        Ok(())
    }

    fn extract_by_dictionary(&self, text: &str) -> Vec<Candidate> {
        self.terms
            .iter()
            .flat_map(|rule| {
                rule.regex
                    .find_iter(text)
                    .map(|m| candidate(text, m.start(), m.end(), &rule.label, rule.confidence))
            })
            .collect()
    }

    fn extract_by_patterns(&self, text: &str) -> Vec<Candidate> {
        let mut found = Vec::new();

        for regex in [&*ORG_SUFFIX, &*ORG_PREFIX] {
            for m in regex.find_iter(text) {
                let start = skip_leading_stopwords(text, m.start(), m.end());
                if start < m.end() {
                    found.push(candidate(text, start, m.end(), "ORG", 0.8));
                }
            }
        }

        for caps in HONORIFIC.captures_iter(text) {
            if let Some(name) = caps.get(1) {
                found.push(candidate(text, name.start(), name.end(), "PERSON", 0.7));
            }
        }

        found
    }
}

impl Default for GazetteerNer {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRecognizer for GazetteerNer {
    fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>> {
        let mut candidates = self.extract_by_dictionary(text);
        if self.patterns {
            candidates.extend(self.extract_by_patterns(text));
        }
        Ok(deduplicate(candidates))
    }
}

fn candidate(text: &str, start: usize, end: usize, label: &str, confidence: f32) -> Candidate {
    let char_start = text[..start].chars().count();
    let surface = &text[start..end];
    Candidate {
        span: EntitySpan::new(
            surface,
            label,
            char_start,
            char_start + surface.chars().count(),
        ),
        byte_start: start,
        byte_end: end,
        confidence,
    }
}

fn skip_leading_stopwords(text: &str, mut start: usize, end: usize) -> usize {
    loop {
        let rest = &text[start..end];
        let word_len = rest.find(char::is_whitespace).unwrap_or(rest.len());
        if !LEADING_STOPWORDS.contains(&&rest[..word_len]) || word_len == rest.len() {
            return start;
        }
        let skipped = rest[word_len..].len() - rest[word_len..].trim_start().len();
        start += word_len + skipped;
    }
}

/// Drop overlapping candidates: highest confidence first, then longest
fn deduplicate(mut candidates: Vec<Candidate>) -> Vec<EntitySpan> {
    candidates.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then((b.byte_end - b.byte_start).cmp(&(a.byte_end - a.byte_start)))
            .then(a.byte_start.cmp(&b.byte_start))
    });

    let mut selected: Vec<Candidate> = Vec::new();
    for c in candidates {
        let overlaps = selected
            .iter()
            .any(|s| c.byte_start < s.byte_end && s.byte_start < c.byte_end);
        if !overlaps {
            selected.push(c);
        }
    }

    selected.sort_by_key(|c| c.byte_start);
    selected.into_iter().map(|c| c.span).collect()
}

// ============================================================================
// Precomputed spans
// ============================================================================

/// Spans produced upstream and shipped with the corpus
#[derive(Debug, Clone, Default)]
pub struct PrecomputedSpans {
    spans: Vec<EntitySpan>,
}

impl PrecomputedSpans {
    pub fn new(spans: Vec<EntitySpan>) -> Self {
        Self { spans }
    }
}

impl EntityRecognizer for PrecomputedSpans {
    /// Returns the stored spans, rejecting any whose text is absent from
    /// the document (the spans belong to a different text)
    fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>> {
        if let Some(stray) = self.spans.iter().find(|s| !text.contains(s.text.trim())) {
            return Err(BiographError::Ner(format!(
                "precomputed span '{}' does not occur in the document",
                stray.text
            )));
        }
        Ok(self.spans.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================

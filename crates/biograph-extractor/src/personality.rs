//! Personality reconciliation
//!
//! Validates one raw personality response per person: Big Five scores are
//! clamped to `[0, 1]` (missing ones fall back to the midpoint) and trait
//! adjectives are restricted to the approved vocabulary. Only output that
//! does not have the expected shape at all fails the record.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use biograph_core::{
    normalize_text, BigFive, BiographError, Dimension, PersonalityRecord, Result, SchemaConfig,
};

/// A per-field degradation that still yields a usable record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PersonalityWarning {
    /// Dimension absent; the midpoint was substituted
    MissingDimension { dimension: Dimension },
    /// Dimension outside `[0, 1]`; clamped
    Clamped { dimension: Dimension, raw: f64 },
    /// Trait outside the approved vocabulary; dropped
    DroppedTrait { value: String },
}

/// A validated record plus the degradations applied to produce it
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub record: PersonalityRecord,
    pub warnings: Vec<PersonalityWarning>,
}

impl Reconciled {
    pub fn missing_dimensions(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, PersonalityWarning::MissingDimension { .. }))
            .count()
    }
}

/// Validates raw personality output against the vocabulary
pub struct PersonalityReconciler {
    schema: Arc<SchemaConfig>,
}

impl PersonalityReconciler {
    pub fn new(schema: Arc<SchemaConfig>) -> Self {
        Self { schema }
    }

    pub fn reconcile(&self, person_id: &str, doc_id: &str, raw: &Value) -> Result<Reconciled> {
        let malformed = |reason: String| BiographError::MalformedPersonalityOutput {
            person_id: person_id.to_string(),
            reason,
        };

        let object = raw
            .as_object()
            .ok_or_else(|| malformed(format!("expected a JSON object, got {}", kind(raw))))?;

        let present = |key: &str| !matches!(object.get(key), None | Some(Value::Null));
        if !present("big_five") && !present("traits") {
            return Err(malformed("neither big_five nor traits present".to_string()));
        }

        let mut warnings = Vec::new();

        let scores = match object.get("big_five") {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(other) => {
                return Err(malformed(format!(
                    "big_five must be an object, got {}",
                    kind(other)
                )))
            }
        };
        if let Some(map) = scores {
            if !map.keys().any(|key| Dimension::from_key(key).is_some()) {
                return Err(malformed("big_five names no known dimension".to_string()));
            }
        }

        let mut big_five = BigFive::midpoint();
        for dimension in Dimension::ALL {
            let value = match scores.and_then(|map| dimension_value(map, dimension)) {
                None | Some(Value::Null) => None,
                Some(value) => Some(parse_score(value).ok_or_else(|| {
                    malformed(format!("{dimension} is not numeric: {value}"))
                })?),
            };

            match value {
                None => {
                    warn!(
                        person_id,
                        doc_id,
                        error = %BiographError::MissingDimension(dimension),
                        "substituting midpoint"
                    );
                    warnings.push(PersonalityWarning::MissingDimension { dimension });
                }
                Some(score) => {
                    let clamped = score.clamp(0.0, 1.0);
                    if clamped != score {
                        debug!(person_id, %dimension, raw = score, "clamping score");
                        warnings.push(PersonalityWarning::Clamped {
                            dimension,
                            raw: score,
                        });
                    }
                    big_five.set(dimension, clamped);
                }
            }
        }

        let raw_traits: &[Value] = match object.get("traits") {
            None | Some(Value::Null) => &[],
            Some(Value::Array(items)) => items.as_slice(),
            Some(other) => {
                return Err(malformed(format!(
                    "traits must be an array, got {}",
                    kind(other)
                )))
            }
        };

        let mut traits = BTreeSet::new();
        for item in raw_traits {
            match item.as_str() {
                Some(word) if self.schema.in_vocabulary(word) => {
                    traits.insert(normalize_text(word));
                }
                _ => {
                    let value = item
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| item.to_string());
                    debug!(person_id, trait_value = %value, "dropping trait outside vocabulary");
                    warnings.push(PersonalityWarning::DroppedTrait { value });
                }
            }
        }

        Ok(Reconciled {
            record: PersonalityRecord {
                person_id: person_id.to_string(),
                big_five,
                traits,
                source_doc_id: doc_id.to_string(),
            },
            warnings,
        })
    }
}

/// Full dimension name wins over its initial when a reply carries both
fn dimension_value(map: &Map<String, Value>, dimension: Dimension) -> Option<&Value> {
    let matching = || {
        map.iter()
            .filter(move |(key, _)| Dimension::from_key(key) == Some(dimension))
    };
    matching()
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(dimension.as_str()))
        .or_else(|| matching().next())
        .map(|(_, value)| value)
}

fn parse_score(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    score.is_finite().then_some(score)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Prompt
// ============================================================================

/// Builds the Big Five inference prompt for one person
pub struct PersonalityPrompt {
    schema: Arc<SchemaConfig>,
}

impl PersonalityPrompt {
    pub fn new(schema: Arc<SchemaConfig>) -> Self {
        Self { schema }
    }

    pub fn build(&self, person_name: &str, text: &str) -> String {
        let vocabulary: Vec<&str> = self.schema.vocabulary.iter().map(String::as_str).collect();

        format!(
            r#"You are a personality analysis assistant.

Given a short biography, estimate the Big Five personality traits of {person_name}
and list 2-3 adjectives that best describe them.

Rules:
- Assign a score between 0.0 and 1.0 to each trait (0.2 = low, 0.5 = average, 0.8 = high).
- Choose adjectives only from the approved vocabulary. Do not invent new words.

Approved vocabulary: [{vocabulary}]

Output JSON only:
{{
  "big_five": {{
    "openness": <score>,
    "conscientiousness": <score>,
    "extraversion": <score>,
    "agreeableness": <score>,
    "neuroticism": <score>
  }},
  "traits": ["<adjective>", "<adjective>"]
}}

Text:
"""{text}"""
"#,
            vocabulary = vocabulary.join(", "),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn reconciler() -> PersonalityReconciler {
        PersonalityReconciler::new(Arc::new(SchemaConfig::default()))
    }

    #[test]
    fn test_well_formed_output() {
        let raw = json!({
            "big_five": {"openness": 0.8, "conscientiousness": 0.5, "extraversion": 0.2,
                         "agreeableness": 0.5, "neuroticism": 0.2},
            "traits": ["Curious", "resilient", "curious"]
        });
        let out = reconciler()
            .reconcile("person:jonas_park", "doc_001", &raw)
            .unwrap();

        assert!(out.warnings.is_empty());
        assert_eq!(out.record.big_five, BigFive::new(0.8, 0.5, 0.2, 0.5, 0.2));
        let traits: Vec<_> = out.record.traits.iter().map(String::as_str).collect();
        assert_eq!(traits, vec!["curious", "resilient"]);
    }

    #[test]
    fn test_missing_dimension_uses_midpoint() {
        let raw = json!({"big_five": {"O": 0.9, "C": 0.1, "E": null, "A": "0.4"}, "traits": []});
        let out = reconciler().reconcile("p", "d", &raw).unwrap();

        assert_eq!(out.missing_dimensions(), 2);
        assert_eq!(out.record.big_five.extraversion, 0.5);
        assert_eq!(out.record.big_five.neuroticism, 0.5);
        assert_eq!(out.record.big_five.agreeableness, 0.4);
    }

    #[test]
    fn test_out_of_range_clamped() {
        let raw = json!({"big_five": {"openness": 1.7, "conscientiousness": -0.3,
                                      "extraversion": 0.5, "agreeableness": 0.5, "neuroticism": 0.5}});
        let out = reconciler().reconcile("p", "d", &raw).unwrap();

        assert_eq!(out.record.big_five.openness, 1.0);
        assert_eq!(out.record.big_five.conscientiousness, 0.0);
        assert_eq!(out.warnings.len(), 2);
    }

    #[test]
    fn test_unknown_traits_dropped_record_kept() {
        let raw = json!({"big_five": {"openness": 0.5}, "traits": ["grumpy", 42]});
        let out = reconciler().reconcile("p", "d", &raw).unwrap();

        assert!(out.record.traits.is_empty());
        assert!(out
            .warnings
            .contains(&PersonalityWarning::DroppedTrait { value: "grumpy".to_string() }));
        assert!(out
            .warnings
            .contains(&PersonalityWarning::DroppedTrait { value: "42".to_string() }));
    }

    #[test]
    fn test_non_numeric_score_is_malformed() {
        let raw = json!({"big_five": {"openness": "very high"}});
        let err = reconciler().reconcile("p", "d", &raw).unwrap_err();
        assert!(matches!(err, BiographError::MalformedPersonalityOutput { .. }));
    }

    #[test]
    fn test_wrong_shapes_are_malformed() {
        for raw in [
            json!(["curious"]),
            json!("openness: high"),
            json!({"big_five": [0.1, 0.2]}),
            json!({"big_five": {}, "traits": "curious"}),
            json!({"big_five": {"openness": "NaN"}}),
        ] {
            assert!(
                reconciler().reconcile("p", "d", &raw).is_err(),
                "expected malformed: {raw}"
            );
        }
    }

    #[test]
    fn test_reply_without_personality_fields_is_malformed() {
        for raw in [
            json!({"error": "model overloaded"}),
            json!({}),
            json!({"relations": []}),
            json!({"big_five": null, "traits": null}),
            json!({"big_five": {"humility": 0.9}}),
        ] {
            let err = reconciler().reconcile("p", "d", &raw).unwrap_err();
            assert!(
                matches!(err, BiographError::MalformedPersonalityOutput { .. }),
                "expected malformed: {raw}"
            );
        }
    }

    #[test]
    fn test_traits_only_reply_is_kept() {
        let raw = json!({"traits": ["curious"]});
        let out = reconciler().reconcile("p", "d", &raw).unwrap();
        assert_eq!(out.missing_dimensions(), 5);
        assert!(out.record.traits.contains("curious"));
    }

    #[test]
    fn test_full_dimension_name_beats_initial() {
        let raw = json!({"big_five": {"O": 0.1, "openness": 0.9, "N": 0.3}});
        let out = reconciler().reconcile("p", "d", &raw).unwrap();
        assert_eq!(out.record.big_five.openness, 0.9);
        assert_eq!(out.record.big_five.neuroticism, 0.3);
    }

    #[test]
    fn test_prompt_names_person_and_vocabulary() {
        let prompt = PersonalityPrompt::new(Arc::new(SchemaConfig::default()))
            .build("Jonas Park", "Jonas Park is a curious analyst.");
        assert!(prompt.contains("traits of Jonas Park"));
        assert!(prompt.contains("meticulous"));
    }

    fn arb_score() -> impl Strategy<Value = Value> {
        prop_oneof![
            (-2.0f64..3.0).prop_map(|v| json!(v)),
            (-2.0f64..3.0).prop_map(|v| json!(v.to_string())),
            Just(Value::Null),
        ]
    }

    fn arb_trait() -> impl Strategy<Value = String> {
        prop_oneof![
            prop::sample::select(vec!["curious", "Organized", " anxious ", "diplomatic"])
                .prop_map(str::to_string),
            "[a-z]{1,12}",
        ]
    }

    proptest! {
        #[test]
        fn prop_outputs_never_escape_validation(
            scores in prop::collection::vec(arb_score(), 5),
            traits in prop::collection::vec(arb_trait(), 0..8),
        ) {
            let names = ["openness", "conscientiousness", "extraversion", "agreeableness", "neuroticism"];
            let big_five: Map<String, Value> = names
                .iter()
                .zip(scores)
                .map(|(k, v)| (k.to_string(), v))
                .collect();
            let raw = json!({"big_five": big_five, "traits": traits});

            let schema = SchemaConfig::default();
            let out = reconciler().reconcile("p", "d", &raw).unwrap();
            prop_assert!(out.record.big_five.in_range());
            for word in &out.record.traits {
                prop_assert!(schema.vocabulary.contains(word));
            }
        }
    }
}

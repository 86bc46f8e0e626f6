//! Requirement list parsing.
//!
//! A specification arrives either as a flat list of requirement strings or
//! as a JSON object. The shape is resolved once into a
//! [`SpecificationInput`]; [`parse_requirements`] then turns it into the
//! ordered [`Requirement`] sequence the compliance engine consumes.
//!
//! Object input has two forms:
//!
//! ```json
//! { "requirements": [ { "id": "R1", "text": "...", "expected": "..." } ] }
//! ```
//!
//! or any other object, where every key becomes one requirement whose text
//! is the stringified value.
//!
//! Parsing never fails on individual entries. Missing ids are synthesized,
//! missing text becomes `""`, and duplicate ids are suffixed `_2`, `_3`, …

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RagError, Result};

/// Key whose array value lists requirement objects directly.
pub const REQUIREMENTS_KEY: &str = "requirements";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub text: String,
    pub expected_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpecificationInput {
    List(Vec<String>),
    Mapping(Map<String, Value>),
}

impl SpecificationInput {
    /// Resolve the shape of a JSON value. Arrays become
    /// [`List`](SpecificationInput::List) (non-string entries are
    /// stringified); objects become [`Mapping`](SpecificationInput::Mapping).
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => Ok(SpecificationInput::List(
                items.into_iter().map(stringify).collect(),
            )),
            Value::Object(map) => Ok(SpecificationInput::Mapping(map)),
            other => Err(RagError::unsupported(format!(
                "specification must be a list or an object, got {}",
                json_type(&other)
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SpecificationInput::List(items) => items.is_empty(),
            SpecificationInput::Mapping(map) => map.is_empty(),
        }
    }
}

impl From<Vec<String>> for SpecificationInput {
    fn from(items: Vec<String>) -> Self {
        SpecificationInput::List(items)
    }
}

pub fn parse_requirements(input: &SpecificationInput) -> Vec<Requirement> {
    let raw: Vec<Requirement> = match input {
        SpecificationInput::List(items) => items
            .iter()
            .enumerate()
            .map(|(i, text)| Requirement {
                id: ordinal_id(i),
                text: text.clone(),
                expected_value: None,
            })
            .collect(),
        SpecificationInput::Mapping(map) => match map.get(REQUIREMENTS_KEY) {
            Some(Value::Array(entries)) => entries
                .iter()
                .enumerate()
                .map(|(i, entry)| requirement_from_entry(i, entry))
                .collect(),
            _ => map
                .iter()
                .map(|(key, value)| Requirement {
                    id: key.clone(),
                    text: stringify(value.clone()),
                    expected_value: None,
                })
                .collect(),
        },
    };

    deduplicate_ids(raw)
}

/// Read a specification file. `.json` files are parsed as JSON; any other
/// file is one requirement per non-empty line.
pub fn load_specification(path: &Path) -> Result<SpecificationInput> {
    if !path.is_file() {
        return Err(RagError::FileNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        let value: Value = serde_json::from_str(&content).map_err(|e| {
            RagError::unsupported(format!("invalid specification JSON in {}: {}", path.display(), e))
        })?;
        return SpecificationInput::from_value(value);
    }

    Ok(SpecificationInput::List(
        content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
    ))
}

fn ordinal_id(index: usize) -> String {
    format!("REQ_{:03}", index + 1)
}

fn requirement_from_entry(index: usize, entry: &Value) -> Requirement {
    match entry {
        Value::Object(obj) => Requirement {
            id: obj
                .get("id")
                .filter(|v| !v.is_null())
                .map(|v| stringify(v.clone()))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| ordinal_id(index)),
            text: obj
                .get("text")
                .filter(|v| !v.is_null())
                .map(|v| stringify(v.clone()))
                .unwrap_or_default(),
            expected_value: obj
                .get("expected")
                .filter(|v| !v.is_null())
                .map(|v| stringify(v.clone())),
        },
        Value::String(text) => Requirement {
            id: ordinal_id(index),
            text: text.clone(),
            expected_value: None,
        },
        _ => Requirement {
            id: ordinal_id(index),
            text: String::new(),
            expected_value: None,
        },
    }
}

fn deduplicate_ids(requirements: Vec<Requirement>) -> Vec<Requirement> {
    let mut seen: HashSet<String> = HashSet::with_capacity(requirements.len());
    requirements
        .into_iter()
        .map(|mut req| {
            if !seen.insert(req.id.clone()) {
                let base = req.id.clone();
                let mut n = 2;
                while seen.contains(&format!("{}_{}", base, n)) {
                    n += 1;
                }
                req.id = format!("{}_{}", base, n);
                seen.insert(req.id.clone());
            }
            req
        })
        .collect()
}

/// Strings as-is, everything else as compact JSON.
fn stringify(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Vec<Requirement> {
        parse_requirements(&SpecificationInput::from_value(value).unwrap())
    }

    fn ids(reqs: &[Requirement]) -> Vec<&str> {
        reqs.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_flat_list_gets_ordinal_ids() {
        let reqs = parse(json!(["req A", "req B"]));
        assert_eq!(ids(&reqs), vec!["REQ_001", "REQ_002"]);
        assert_eq!(reqs[0].text, "req A");
        assert_eq!(reqs[1].text, "req B");
        assert!(reqs.iter().all(|r| r.expected_value.is_none()));
    }

    #[test]
    fn test_requirements_key_uses_entries() {
        let reqs = parse(json!({
            "requirements": [
                {"id": "R-1", "text": "Warranty of two years", "expected": "24 months"},
                {"text": "No id here"},
                {"id": "R-3"},
                "bare string",
                42
            ]
        }));
        assert_eq!(ids(&reqs), vec!["R-1", "REQ_002", "R-3", "REQ_004", "REQ_005"]);
        assert_eq!(reqs[0].expected_value.as_deref(), Some("24 months"));
        assert_eq!(reqs[1].text, "No id here");
        assert_eq!(reqs[2].text, "");
        assert_eq!(reqs[3].text, "bare string");
        assert_eq!(reqs[4].text, "");
    }

    #[test]
    fn test_flat_mapping_one_per_key_in_order() {
        let reqs = parse(json!({
            "delivery": "within 10 days",
            "payment": "net 30",
            "penalty": 5
        }));
        assert_eq!(ids(&reqs), vec!["delivery", "payment", "penalty"]);
        assert_eq!(reqs[2].text, "5");
    }

    #[test]
    fn test_requirements_key_not_a_list_is_flattened() {
        let reqs = parse(json!({"requirements": "see annex", "scope": "all goods"}));
        assert_eq!(ids(&reqs), vec!["requirements", "scope"]);
        assert_eq!(reqs[0].text, "see annex");
    }

    #[test]
    fn test_duplicate_ids_are_suffixed() {
        let reqs = parse(json!({
            "requirements": [
                {"id": "A", "text": "one"},
                {"id": "A", "text": "two"},
                {"id": "A_2", "text": "three"},
                {"id": "A", "text": "four"}
            ]
        }));
        assert_eq!(ids(&reqs), vec!["A", "A_2", "A_2_2", "A_3"]);
    }

    #[test]
    fn test_scalar_input_rejected() {
        let err = SpecificationInput::from_value(json!("just text")).unwrap_err();
        assert!(matches!(err, RagError::UnsupportedInput(_)));
    }

    #[test]
    fn test_load_specification_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let lines = dir.path().join("spec.txt");
        std::fs::write(&lines, "First requirement\n\n  Second requirement  \n").unwrap();
        let reqs = parse_requirements(&load_specification(&lines).unwrap());
        assert_eq!(ids(&reqs), vec!["REQ_001", "REQ_002"]);
        assert_eq!(reqs[1].text, "Second requirement");

        let json_path = dir.path().join("spec.JSON");
        std::fs::write(&json_path, r#"{"color": "blue"}"#).unwrap();
        let reqs = parse_requirements(&load_specification(&json_path).unwrap());
        assert_eq!(ids(&reqs), vec!["color"]);

        assert!(load_specification(&dir.path().join("missing.json")).is_err());
    }
}

//! Structured (JSON object) responses
//!
//! Schemas for planner, auditor, and repair replies plus a tolerant
//! parser that strips code fences and stray text around the object.

use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

/// The backend's structured output could not be used
#[derive(Debug, Error)]
pub enum StructuredError {
    #[error("Response contains no JSON object")]
    NoObject,

    #[error("Response does not match the expected schema: {0}")]
    Schema(#[from] serde_json::Error),
}

static FENCED_JSON: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").ok());

/// Locate the JSON object inside a raw reply
pub fn extract_json_object(raw: &str) -> Option<&str> {
    if let Some(re) = FENCED_JSON.as_ref()
        && let Some(caps) = re.captures(raw)
        && let Some(m) = caps.get(1)
    {
        return Some(m.as_str());
    }

    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&raw[start..=end])
}

/// Parse a raw reply into a schema type
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T, StructuredError> {
    debug!(len = raw.len(), "parse_structured: called");
    let json = extract_json_object(raw).ok_or(StructuredError::NoObject)?;
    Ok(serde_json::from_str(json)?)
}

/// A named synopsis entry in a volume plan
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct VolumeEntry {
    pub name: String,
    pub synopsis: String,
}

/// Volume planner reply
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct VolumePlan {
    pub updated_existing_volumes: Vec<VolumeEntry>,
    pub new_volumes: Vec<VolumeEntry>,
}

/// A named AI summary entry in a chapter plan
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChapterEntry {
    pub name: String,
    pub ai_synopsis: String,
}

/// Chapter planner reply
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChapterPlan {
    pub updated_existing_chapters: Vec<ChapterEntry>,
    pub new_chapters: Vec<ChapterEntry>,
}

/// One flagged chapter from the global audit
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuditFinding {
    pub v_idx: usize,
    pub c_idx: usize,
    #[serde(default)]
    pub reason: String,
}

/// Global audit reply
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AuditReport {
    pub problematic_chapters: Vec<AuditFinding>,
}

/// Setting/logic repair reply
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SettingRepair {
    pub has_issue: bool,
    pub error_reason: String,
    pub corrected_text: String,
    pub new_ai_summary: String,
    pub logs: Vec<String>,
}

/// Typo/prose repair reply
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TypoRepair {
    pub corrected_text: String,
    pub logs: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_object() {
        let plan: VolumePlan =
            parse_structured(r#"{"updated_existing_volumes":[],"new_volumes":[{"name":"V2","synopsis":"war"}]}"#)
                .unwrap();
        assert_eq!(plan.new_volumes[0].name, "V2");
    }

    #[test]
    fn test_parse_fenced_object() {
        let raw = "Here you go:\n```json\n{\"problematic_chapters\": []}\n```\n";
        let report: AuditReport = parse_structured(raw).unwrap();
        assert!(report.problematic_chapters.is_empty());
    }

    #[test]
    fn test_missing_fields_default() {
        let repair: SettingRepair = parse_structured(r#"{"has_issue": true}"#).unwrap();
        assert!(repair.has_issue);
        assert!(repair.corrected_text.is_empty());
        assert!(repair.logs.is_empty());
    }

    #[test]
    fn test_no_object() {
        let result: Result<TypoRepair, _> = parse_structured("I could not do that.");
        assert!(matches!(result, Err(StructuredError::NoObject)));
    }

    #[test]
    fn test_schema_mismatch() {
        let result: Result<AuditReport, _> =
            parse_structured(r#"{"problematic_chapters":[{"v_idx":"first","c_idx":0}]}"#);
        assert!(matches!(result, Err(StructuredError::Schema(_))));
    }

    #[test]
    fn test_truncated_object() {
        let result: Result<TypoRepair, _> = parse_structured(r#"{"corrected_text": "unfinished"#);
        assert!(result.is_err());
    }
}

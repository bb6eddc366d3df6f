//! Feature requests: typed in directly or read from a JSONL instruction file.

use crate::error::{self, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// A free-text description of the feature to test
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureRequest(String);

impl FeatureRequest {
    pub fn new(text: impl AsRef<str>) -> Result<Self> {
        let text = text.as_ref().trim();
        if text.is_empty() {
            return Err(Error::invalid_argument("feature description is empty")
                .with_operation("input::feature_request"));
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeatureRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Deserialize)]
struct InstructionRecord {
    #[serde(rename = "Instruction")]
    instruction: String,
}

/// Parse JSONL text: one object per non-blank line, each with a string
/// `Instruction` field. Other fields are ignored.
pub fn parse_instructions(text: &str, origin: &str) -> Result<Vec<FeatureRequest>> {
    let mut requests = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let record: InstructionRecord = serde_json::from_str(line)
            .map_err(|e| error::parse_line_failed(origin, line_no, e.to_string()).set_source(e))?;
        let request = FeatureRequest::new(&record.instruction)
            .map_err(|_| error::parse_line_failed(origin, line_no, "empty Instruction"))?;
        requests.push(request);
    }
    debug!(origin, count = requests.len(), "parsed instructions");
    Ok(requests)
}

/// Read every instruction from a JSONL file
pub async fn read_instructions(path: impl AsRef<Path>) -> Result<Vec<FeatureRequest>> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| error::io_error(path, e).with_operation("input::read_instructions"))?;
    parse_instructions(&text, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_feature_request_trims() {
        let req = FeatureRequest::new("  acc kernels  \n").unwrap();
        assert_eq!(req.as_str(), "acc kernels");
        assert_eq!(req.to_string(), "acc kernels");

        let err = FeatureRequest::new(" \t").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_parse_instructions() {
        let text = r#"{"Instruction": "acc parallel", "Category": "compute"}

{"Instruction": "acc data copyin", "id": 7}
"#;
        let requests = parse_instructions(text, "batch.jsonl").unwrap();
        let texts: Vec<&str> = requests.iter().map(|r| r.as_str()).collect();
        assert_eq!(texts, vec!["acc parallel", "acc data copyin"]);
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let text = "{\"Instruction\": \"acc parallel\"}\n{\"Prompt\": \"missing\"}\n";
        let err = parse_instructions(text, "batch.jsonl").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailed);
        assert_eq!(err.context_value("line"), Some("2"));
        assert_eq!(err.context_value("path"), Some("batch.jsonl"));

        let err = parse_instructions("{\"Instruction\": \"  \"}", "x").unwrap_err();
        assert_eq!(err.context_value("line"), Some("1"));
    }

    #[tokio::test]
    async fn test_read_instructions_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instructions.jsonl");
        std::fs::write(&path, "{\"Instruction\": \"acc update host\"}\n").unwrap();

        let requests = read_instructions(&path).await.unwrap();
        assert_eq!(requests.len(), 1);

        let err = read_instructions(dir.path().join("missing.jsonl")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }
}

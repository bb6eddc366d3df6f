//! Generator configuration, loadable from a partial JSON file.

use accval_core::{
    EmbeddingConfig, Error, ProviderConfig, Result, SamplingParams, SourceLanguage, SplitterConfig,
    ToolchainConfig, DEFAULT_TOP_K,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default system message for test generation
pub const DEFAULT_SYSTEM_PROMPT: &str = "Write OpenACC compiler validation tests";

/// Everything the loop needs, with defaults matching a local deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Failed attempts that may be retried; total attempts is one more
    pub max_retries: usize,
    /// Passages retrieved per feature
    pub top_k_passages: usize,
    /// Where each attempt's code is written; its extension picks the toolchain
    pub source_path: PathBuf,
    /// Ask the completion service to judge every attempt
    pub evaluate: bool,
    /// End the prompt with an opened fence
    pub prime_fence: bool,
    /// Extra tries for a transient completion-service failure
    pub completion_retries: usize,
    /// Back-off before completion retry n is n times this
    pub retry_backoff_ms: u64,
    /// Empty to send the prompt without a system message
    pub system_prompt: String,
    pub generation: SamplingParams,
    pub evaluation: SamplingParams,
    pub provider: ProviderConfig,
    pub embedding: EmbeddingConfig,
    pub splitter: SplitterConfig,
    pub toolchain: ToolchainConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            top_k_passages: DEFAULT_TOP_K,
            source_path: PathBuf::from("parsedTest.c"),
            evaluate: true,
            prime_fence: true,
            completion_retries: 2,
            retry_backoff_ms: 1000,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            generation: SamplingParams::generation(),
            evaluation: SamplingParams::evaluation(),
            provider: ProviderConfig::nim(),
            embedding: EmbeddingConfig::default(),
            splitter: SplitterConfig::default(),
            toolchain: ToolchainConfig::default(),
        }
    }
}

impl GeneratorConfig {
    /// Parse a JSON document; omitted fields keep their defaults
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| {
            Error::config_invalid(format!("invalid configuration: {}", e))
                .with_operation("config::parse")
                .set_source(e)
        })
    }

    /// Load and validate a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::from(e)
                .with_operation("config::load")
                .with_context("path", path.display().to_string())
        })?;
        let config = Self::from_json_str(&text).map_err(|e| e.with_context("path", path.display().to_string()))?;
        config.validate()?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// The language of the generated source, from `source_path`
    pub fn language(&self) -> Result<SourceLanguage> {
        SourceLanguage::from_path(&self.source_path)
    }

    /// Reject settings that would fail only after work has started
    pub fn validate(&self) -> Result<()> {
        self.language().map_err(|e| e.with_operation("config::validate"))?;
        if self.top_k_passages == 0 {
            return Err(Error::config_invalid("top_k_passages must be at least 1")
                .with_operation("config::validate"));
        }
        self.toolchain.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accval_core::ErrorKind;

    #[test]
    fn test_defaults() {
        let config = GeneratorConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.top_k_passages, 3);
        assert_eq!(config.source_path, PathBuf::from("parsedTest.c"));
        assert_eq!(config.language().unwrap(), SourceLanguage::C);
        assert_eq!(config.generation.temperature, Some(0.7));
        assert_eq!(config.evaluation.max_tokens, Some(100));
        assert_eq!(config.toolchain.run_timeout_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = GeneratorConfig::from_json_str(
            r#"{"max_retries": 1, "source_path": "gen/test.f90", "toolchain": {"run_timeout_secs": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.language().unwrap(), SourceLanguage::Fortran);
        assert_eq!(config.toolchain.run_timeout_secs, 5);
        assert_eq!(config.toolchain.fortran_compiler, "nvfortran");
        assert_eq!(config.splitter.chunk_size, 500);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = GeneratorConfig::from_json_str(r#"{"max_retry": 1}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_validate() {
        let config = GeneratorConfig {
            source_path: PathBuf::from("test.rs"),
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::UnsupportedSourceType);

        let config = GeneratorConfig {
            top_k_passages: 0,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::ConfigInvalid);

        let mut config = GeneratorConfig::default();
        config.toolchain.run_timeout_secs = 0;
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accval.json");
        std::fs::write(&path, r#"{"evaluate": false, "top_k_passages": 5}"#).unwrap();

        let config = GeneratorConfig::from_json_file(&path).unwrap();
        assert!(!config.evaluate);
        assert_eq!(config.top_k_passages, 5);

        let err = GeneratorConfig::from_json_file(dir.path().join("missing.json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }
}

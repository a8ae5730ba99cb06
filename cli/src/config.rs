use blackout_text::ResolverOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "blackout.json";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub stage: StageConfig,
    pub detector: DetectorConfig,
    pub resolver: ResolverOptions,
    pub redaction: RedactionConfig,
    pub pipeline: PipelineConfig,
    pub log: LogConfig,
}

// ============ Stage ============

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct StageConfig {
    /// Directory holding the input and output collections.
    pub root: PathBuf,
    /// Document extension picked up in bulk mode, without the dot.
    pub extension: String,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            extension: "pdf".to_string(),
        }
    }
}

// ============ Detector ============

/// How extracted text is presented to the classifier.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetectionScope {
    /// One request with every page joined by form feeds.
    #[default]
    Document,
    /// One request per non-empty page; instances are stamped with the page.
    Page,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct DetectorConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_prompt_chars: usize,
    pub scope: DetectionScope,
    /// Categories requested in addition to the built-in taxonomy.
    pub categories: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "BLACKOUT_API_KEY".to_string(),
            timeout_secs: 120,
            temperature: 0.0,
            max_prompt_chars: 48_000,
            scope: DetectionScope::Document,
            categories: Vec::new(),
        }
    }
}

impl DetectorConfig {
    /// API key from the configured environment variable, if set and non-blank.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

// ============ Redaction / pipeline ============

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct RedactionConfig {
    pub clean_metadata: bool,
    /// Re-extract every output and warn about values that are still readable.
    pub verify_output: bool,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            clean_metadata: true,
            verify_output: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    pub output_prefix: String,
    /// Below this many extracted characters a near-empty warning is recorded.
    pub min_text_chars: usize,
    pub extraction_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_prefix: "redacted_".to_string(),
            min_text_chars: 20,
            extraction_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    /// Append-only JSONL processing record log.
    pub path: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("blackout-records.jsonl"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = &self.pipeline.output_prefix;
        if prefix.is_empty() || prefix.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "pipeline.outputPrefix must be a non-empty file-name prefix, got {prefix:?}"
            )));
        }
        if self.stage.extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::Invalid("stage.extension is empty".to_string()));
        }
        if self.resolver.min_chars == 0 {
            return Err(ConfigError::Invalid("resolver.minChars must be at least 1".to_string()));
        }
        if !self.resolver.margin.is_finite() || self.resolver.margin < 0.0 {
            return Err(ConfigError::Invalid("resolver.margin must be >= 0".to_string()));
        }
        if self.detector.timeout_secs == 0 || self.pipeline.extraction_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }
        if self.detector.max_prompt_chars == 0 {
            return Err(ConfigError::Invalid("detector.maxPromptChars must be positive".to_string()));
        }
        Ok(())
    }

    /// Extension without a leading dot.
    pub fn extension(&self) -> &str {
        self.stage.extension.trim_start_matches('.')
    }
}

/// Loads the configuration file.
///
/// Without an explicit path, a missing `blackout.json` means defaults. A path
/// named explicitly must exist.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    if !path.exists() {
        if explicit {
            return Err(ConfigError::NotFound(path));
        }
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(&path)?;
    let config: AppConfig = serde_json::from_str(&raw)?;
    config.validate()?;
    log::debug!("[Config] loaded {}", path.display());
    Ok(config)
}

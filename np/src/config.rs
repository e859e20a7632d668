//! NovelPilot configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Main NovelPilot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Sampling temperature per operation
    pub temperature: TemperatureConfig,

    /// Context and skip thresholds
    pub limits: LimitsConfig,

    /// Event persistence
    pub events: EventsConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Fails fast when the API key environment variable is missing.
    pub fn validate(&self) -> Result<()> {
        debug!(api_key_env = %self.llm.api_key_env, "validate: called");
        if std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        debug!(?config_path, "load: called");
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: .novelpilot.yml
        let local_config = PathBuf::from(".novelpilot.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/novelpilot/novelpilot.yml
        if let Some(user_config) = Self::user_config_path()
            && user_config.exists()
        {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Errors are swallowed; the full load reports them later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".novelpilot.yml")];
                paths.extend(Self::user_config_path());
                paths
            }
        };

        candidates
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("novelpilot").join("novelpilot.yml"))
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name ("deepseek" or "openai"; both speak chat completions)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-reasoner".to_string(),
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            base_url: "https://api.deepseek.com".to_string(),
            max_tokens: 6000,
            timeout_ms: 600_000,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        debug!(api_key_env = %self.api_key_env, "get_api_key: called");
        std::env::var(&self.api_key_env).context(format!("Environment variable {} not set", self.api_key_env))
    }
}

/// Sampling temperature per operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureConfig {
    /// Single-chapter generation
    pub generation: f32,

    /// Autopilot planning and drafting
    pub autopilot: f32,

    /// Audit and repair
    pub correction: f32,
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self {
            generation: 1.5,
            autopilot: 0.7,
            correction: 0.7,
        }
    }
}

/// Context-window and skip thresholds, all in characters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Historical summaries beyond this degrade to volume-level summaries
    #[serde(rename = "history-chars")]
    pub history_chars: usize,

    /// Kept tail of the previous chapter
    #[serde(rename = "tail-chars")]
    pub tail_chars: usize,

    /// Chapters with more content than this are treated as written
    #[serde(rename = "written-content-chars")]
    pub written_content_chars: usize,

    /// Synopses shorter than this count as blank
    #[serde(rename = "short-text-chars")]
    pub short_text_chars: usize,

    /// Volume planning is skipped at or above this many volumes
    #[serde(rename = "min-volumes")]
    pub min_volumes: usize,

    /// Chapter planning is skipped at or above this many chapters per volume
    #[serde(rename = "min-chapters")]
    pub min_chapters: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            history_chars: 15_000,
            tail_chars: 1_500,
            written_content_chars: 100,
            short_text_chars: 10,
            min_volumes: 5,
            min_chapters: 4,
        }
    }
}

impl LimitsConfig {
    /// Trimmed text shorter than the blank threshold
    pub fn is_short(&self, text: &str) -> bool {
        text.trim().chars().count() < self.short_text_chars
    }

    /// Trimmed content longer than the written threshold
    pub fn is_written(&self, content: &str) -> bool {
        content.trim().chars().count() > self.written_content_chars
    }
}

/// Event persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Write each task's events to a JSONL file
    pub persist: bool,

    /// Override for the runs directory
    #[serde(rename = "runs-dir")]
    pub runs_dir: Option<PathBuf>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            persist: true,
            runs_dir: None,
        }
    }
}

impl EventsConfig {
    /// Directory holding per-task event logs
    pub fn resolved_runs_dir(&self) -> PathBuf {
        self.runs_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("novelpilot")
                .join("runs")
        })
    }
}

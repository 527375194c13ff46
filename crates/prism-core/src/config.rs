use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PrismError;
use crate::types::FileCategory;

/// Environment variables consulted, in order, when no API key is configured.
const API_KEY_ENV_VARS: [&str; 3] = ["PRISM_API_KEY", "OPENAI_API_KEY", "ANTHROPIC_API_KEY"];

/// Top-level configuration loaded from `.prism.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use prism_core::PrismConfig;
///
/// let config = PrismConfig::default();
/// assert_eq!(config.review.deep_dive_budget, 40_000);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrismConfig {
    /// LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Pass budgets and pipeline behavior.
    #[serde(default)]
    pub review: ReviewConfig,
    /// Priority scorer constants.
    #[serde(default)]
    pub scoring: ScoringConfig,
}

impl PrismConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PrismError::Io`] if the file cannot be read, or
    /// [`PrismError::Toml`] if the content is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, PrismError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`PrismError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use prism_core::PrismConfig;
    ///
    /// let toml = r#"
    /// [review]
    /// security_budget = 10000
    /// "#;
    /// let config = PrismConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.review.security_budget, 10_000);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, PrismError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }
}

/// LLM provider configuration.
///
/// # Examples
///
/// ```
/// use prism_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "gpt-4o");
/// assert_eq!(config.max_tokens, 4096);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name (e.g. `"openai"`, `"ollama"`).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for API requests.
    pub base_url: Option<String>,
    /// Maximum tokens the model may generate per pass.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_provider() -> String {
    "openai".into()
}

fn default_model() -> String {
    "gpt-4o".into()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.1
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl LlmConfig {
    /// The configured API key, falling back to well-known environment variables.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                API_KEY_ENV_VARS
                    .iter()
                    .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            })
    }
}

/// Review pipeline configuration.
///
/// # Examples
///
/// ```
/// use prism_core::ReviewConfig;
///
/// let config = ReviewConfig::default();
/// assert_eq!(config.architecture_budget, 15_000);
/// assert_eq!(config.security_budget, 25_000);
/// assert!(!config.abort_on_provider_error);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Token budget for the architecture pass (default: 15000).
    #[serde(default = "default_architecture_budget")]
    pub architecture_budget: usize,
    /// Token budget for the deep-dive pass (default: 40000).
    #[serde(default = "default_deep_dive_budget")]
    pub deep_dive_budget: usize,
    /// Token budget for the security pass (default: 25000).
    #[serde(default = "default_security_budget")]
    pub security_budget: usize,
    /// Upper bound on characters of sliced content per file (default: 20000).
    #[serde(default = "default_slice_max_chars")]
    pub slice_max_chars: usize,
    /// Stop the remaining passes after a provider failure (default: false).
    #[serde(default)]
    pub abort_on_provider_error: bool,
    /// Whole-pipeline timeout in seconds (default: 600).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_architecture_budget() -> usize {
    15_000
}

fn default_deep_dive_budget() -> usize {
    40_000
}

fn default_security_budget() -> usize {
    25_000
}

fn default_slice_max_chars() -> usize {
    20_000
}

fn default_timeout_secs() -> u64 {
    600
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            architecture_budget: default_architecture_budget(),
            deep_dive_budget: default_deep_dive_budget(),
            security_budget: default_security_budget(),
            slice_max_chars: default_slice_max_chars(),
            abort_on_provider_error: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Priority scorer constants and category precedence.
///
/// # Examples
///
/// ```
/// use prism_core::{FileCategory, ScoringConfig};
///
/// let scoring = ScoringConfig::default();
/// assert_eq!(scoring.entry_base, 100);
/// assert_eq!(scoring.category_precedence[0], FileCategory::Test);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub entry_base: i64,
    pub config_base: i64,
    pub api_base: i64,
    /// Points per importing file.
    pub importer_weight: i64,
    /// Points per import specifier, capped at `import_cap`.
    pub import_weight: i64,
    pub import_cap: i64,
    /// Points per exported name, capped at `export_cap`.
    pub export_weight: i64,
    pub export_cap: i64,
    /// Bonus for security-sensitive paths.
    pub security_bonus: i64,
    /// Size in bytes above which `large_penalty` applies.
    pub large_file_bytes: u64,
    pub large_penalty: i64,
    /// Size in bytes above which `huge_penalty` also applies.
    pub huge_file_bytes: u64,
    pub huge_penalty: i64,
    pub test_penalty: i64,
    /// Order in which category patterns are tried. `other` is implicit.
    pub category_precedence: Vec<FileCategory>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            entry_base: 100,
            config_base: 80,
            api_base: 70,
            importer_weight: 10,
            import_weight: 2,
            import_cap: 20,
            export_weight: 3,
            export_cap: 30,
            security_bonus: 50,
            large_file_bytes: 50 * 1024,
            large_penalty: 20,
            huge_file_bytes: 100 * 1024,
            huge_penalty: 30,
            test_penalty: 40,
            category_precedence: vec![
                FileCategory::Test,
                FileCategory::Config,
                FileCategory::Api,
                FileCategory::Entry,
                FileCategory::Component,
                FileCategory::Util,
            ],
        }
    }
}

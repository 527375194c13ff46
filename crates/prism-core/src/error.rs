use std::path::PathBuf;

/// Errors that can occur across the Prism workspace.
///
/// Library crates use this type directly; the binary crate converts to
/// `miette` diagnostics at the boundary.
///
/// # Examples
///
/// ```
/// use prism_core::PrismError;
///
/// let err = PrismError::Config("missing API key".into());
/// assert!(err.to_string().contains("missing API key"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum PrismError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    #[diagnostic(code(prism::io))]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(code(prism::config), help("check your .prism.toml"))]
    Config(String),

    /// The AI provider exchange failed.
    #[error("provider error: {0}")]
    #[diagnostic(code(prism::provider))]
    Provider(#[from] ProviderError),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    #[diagnostic(code(prism::serialization))]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    #[diagnostic(code(prism::toml), help("check your .prism.toml syntax"))]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    #[diagnostic(code(prism::file_not_found))]
    FileNotFound(PathBuf),
}

/// Failure reported by an AI chat exchange.
///
/// Covers transport failures, non-success HTTP statuses, and error payloads
/// returned by the provider itself.
///
/// # Examples
///
/// ```
/// use prism_core::ProviderError;
///
/// let err = ProviderError::new("rate limited").with_status(429).with_code("rate_limit");
/// assert_eq!(err.to_string(), "rate limited (status 429, code rate_limit)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}{}", details(.status.as_ref().copied(), .code.as_deref()))]
pub struct ProviderError {
    /// Human-readable failure description.
    pub message: String,
    /// Provider-specific error code, if any.
    pub code: Option<String>,
    /// HTTP status, if the failure came from a response.
    pub status: Option<u16>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

fn details(status: Option<u16>, code: Option<&str>) -> String {
    match (status, code) {
        (Some(s), Some(c)) => format!(" (status {s}, code {c})"),
        (Some(s), None) => format!(" (status {s})"),
        (None, Some(c)) => format!(" (code {c})"),
        (None, None) => String::new(),
    }
}

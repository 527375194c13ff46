use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A scanned source file.
///
/// Identity is [`relative_path`](Self::relative_path), which always uses `/`
/// separators and is unique within a run.
///
/// # Examples
///
/// ```
/// use prism_core::FileRecord;
///
/// let record = FileRecord::inline("src/index.ts", "export const a = 1;");
/// assert_eq!(record.extension, "ts");
/// assert_eq!(record.size, 19);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to the repository root.
    pub relative_path: String,
    /// Extension without the leading dot (empty if none).
    pub extension: String,
    /// File size in bytes.
    pub size: u64,
    /// Preloaded text, if the scanner already read it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl FileRecord {
    /// Build a record whose content is already in memory.
    ///
    /// The absolute path is set to the relative path and the size to the
    /// content length, which is what tests and in-memory callers want.
    pub fn inline(relative_path: impl Into<String>, content: impl Into<String>) -> Self {
        let relative_path = relative_path.into();
        let content = content.into();
        Self {
            path: PathBuf::from(&relative_path),
            extension: extension_of(&relative_path),
            size: content.len() as u64,
            relative_path,
            content: Some(content),
        }
    }
}

/// Extension of a `/`-separated path, without the dot.
pub fn extension_of(relative_path: &str) -> String {
    let name = relative_path.rsplit('/').next().unwrap_or(relative_path);
    match name.rfind('.') {
        Some(idx) if idx > 0 => name[idx + 1..].to_string(),
        _ => String::new(),
    }
}

/// Role of a file in the repository, used for prioritization and selection.
///
/// # Examples
///
/// ```
/// use prism_core::FileCategory;
///
/// let c: FileCategory = serde_json::from_str("\"entry\"").unwrap();
/// assert_eq!(c, FileCategory::Entry);
/// assert_eq!(c.to_string(), "entry");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Test,
    Config,
    Api,
    Entry,
    Component,
    Util,
    Other,
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileCategory::Test => "test",
            FileCategory::Config => "config",
            FileCategory::Api => "api",
            FileCategory::Entry => "entry",
            FileCategory::Component => "component",
            FileCategory::Util => "util",
            FileCategory::Other => "other",
        };
        f.write_str(s)
    }
}

/// Finding severity level.
///
/// Order: Error > Warning > Info > Hint.
///
/// # Examples
///
/// ```
/// use prism_core::Severity;
///
/// let s: Severity = serde_json::from_str("\"error\"").unwrap();
/// assert_eq!(s, Severity::Error);
/// assert!(Severity::Error.rank() > Severity::Warning.rank());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A defect or vulnerability that should be fixed.
    Error,
    /// A potential issue worth investigating.
    Warning,
    /// Informational observation.
    Info,
    /// Minor hint.
    Hint,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
            Severity::Hint => write!(f, "hint"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Severity::Error),
            "warning" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            "hint" => Ok(Severity::Hint),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

impl Severity {
    /// Numeric rank, higher is more severe.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Error => 3,
            Severity::Warning => 2,
            Severity::Info => 1,
            Severity::Hint => 0,
        }
    }

    /// Map a free-form severity label to a [`Severity`].
    ///
    /// Accepts the canonical names plus the informal `critical`/`high`
    /// (error), `medium` (warning) and `low` (info). Anything else is info.
    ///
    /// # Examples
    ///
    /// ```
    /// use prism_core::Severity;
    ///
    /// assert_eq!(Severity::from_loose("CRITICAL"), Severity::Error);
    /// assert_eq!(Severity::from_loose("medium"), Severity::Warning);
    /// assert_eq!(Severity::from_loose("whatever"), Severity::Info);
    /// ```
    pub fn from_loose(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "error" | "critical" | "high" => Severity::Error,
            "warning" | "medium" => Severity::Warning,
            "hint" => Severity::Hint,
            _ => Severity::Info,
        }
    }
}

/// A single reported issue.
///
/// # Examples
///
/// ```
/// use prism_core::{Finding, Severity};
///
/// let f = Finding::new("ai/security/sqli", Severity::Error, "src/db.ts", "SQL injection")
///     .at_line(42);
/// assert_eq!(f.line, Some(42));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Rule identifier, e.g. `ai/arch/layering`.
    pub rule_id: String,
    /// Severity of the finding.
    pub severity: Severity,
    /// Relative path of the affected file.
    pub file: String,
    /// 1-based line, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Explanation of the issue.
    pub message: String,
    /// Optional fix suggestion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Finding {
    pub fn new(
        rule_id: impl Into<String>,
        severity: Severity,
        file: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity,
            file: file.into(),
            line: None,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// One of the three review passes, in execution order.
///
/// # Examples
///
/// ```
/// use prism_core::PassKind;
///
/// assert_eq!(PassKind::ALL[0], PassKind::Architecture);
/// assert_eq!(PassKind::DeepDive.to_string(), "deep-dive");
/// assert_eq!(PassKind::Architecture.rule_prefix(), "ai/arch");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassKind {
    Architecture,
    DeepDive,
    Security,
}

impl PassKind {
    /// All passes in the fixed order they run.
    pub const ALL: [PassKind; 3] = [PassKind::Architecture, PassKind::DeepDive, PassKind::Security];

    /// Prefix for rule ids produced by this pass.
    pub fn rule_prefix(self) -> &'static str {
        match self {
            PassKind::Architecture => "ai/arch",
            PassKind::DeepDive => "ai/deep",
            PassKind::Security => "ai/security",
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassKind::Architecture => write!(f, "architecture"),
            PassKind::DeepDive => write!(f, "deep-dive"),
            PassKind::Security => write!(f, "security"),
        }
    }
}

/// A framework detected in the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedFramework {
    pub name: String,
    /// Detection confidence (0.0–1.0).
    pub confidence: f64,
}

/// Framework and language metadata. Only used to populate prompt text.
///
/// # Examples
///
/// ```
/// use prism_core::FrameworkInfo;
///
/// let info = FrameworkInfo::default();
/// assert_eq!(info.label(), "unknown");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkInfo {
    pub frameworks: Vec<DetectedFramework>,
    pub primary: Option<String>,
    pub languages: Vec<String>,
}

impl FrameworkInfo {
    /// Short description for prompts, e.g. `next (typescript, javascript)`.
    pub fn label(&self) -> String {
        match (&self.primary, self.languages.is_empty()) {
            (Some(p), false) => format!("{p} ({})", self.languages.join(", ")),
            (Some(p), true) => p.clone(),
            (None, false) => self.languages.join(", "),
            (None, true) => "unknown".into(),
        }
    }

    /// Names of all detected frameworks.
    pub fn names(&self) -> Vec<String> {
        self.frameworks.iter().map(|f| f.name.clone()).collect()
    }
}

/// Output format for CLI subcommands.
///
/// # Examples
///
/// ```
/// use prism_core::OutputFormat;
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summary.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use prism_core::{Finding, FrameworkInfo, PassKind, PrismConfig, PrismError, ReviewConfig, Severity};
use prism_graph::graph::DependencyGraph;
use prism_graph::source::FileSet;
use serde::Serialize;

use crate::context::{ContextBuilder, InclusionRecord, ReviewContext};
use crate::dedup::deduplicate;
use crate::llm::{ChatProvider, LlmClient, ModelConfig};
use crate::prompt;

/// Rule id of the finding emitted when no credential is configured.
pub const CONFIG_RULE: &str = "ai/config";
/// Rule id of the finding emitted when a provider exchange fails.
pub const PROVIDER_RULE: &str = "ai/provider";

/// Outcome of one review pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassResult {
    pub pass: PassKind,
    pub findings: Vec<Finding>,
    pub summary: String,
    /// Files sent to the model, with the reason each was selected.
    pub included: Vec<InclusionRecord>,
    pub token_estimate: usize,
}

impl PassResult {
    fn empty(pass: PassKind, summary: impl Into<String>) -> Self {
        Self {
            pass,
            findings: Vec::new(),
            summary: summary.into(),
            included: Vec::new(),
            token_estimate: 0,
        }
    }
}

/// Statistics about a review run.
///
/// # Examples
///
/// ```
/// use prism_review::pipeline::ReviewStats;
///
/// let stats = ReviewStats {
///     findings_before_dedup: 7,
///     findings_after_dedup: 5,
///     files_considered: 40,
/// };
/// assert_eq!(stats.findings_before_dedup - stats.findings_after_dedup, 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStats {
    pub findings_before_dedup: usize,
    pub findings_after_dedup: usize,
    /// Files in the dependency graph.
    pub files_considered: usize,
}

/// Final result of a review run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReport {
    /// Deduplicated findings from every pass, in pass order.
    pub findings: Vec<Finding>,
    pub passes: Vec<PassResult>,
    /// Model identifier used for the review.
    pub model: String,
    pub generated_at: DateTime<Utc>,
    pub stats: ReviewStats,
}

impl ReviewReport {
    /// Report for a run skipped because no API key is available.
    ///
    /// # Examples
    ///
    /// ```
    /// use prism_review::pipeline::ReviewReport;
    ///
    /// let report = ReviewReport::missing_credential("gpt-4o", 12);
    /// assert_eq!(report.findings.len(), 1);
    /// assert_eq!(report.findings[0].rule_id, "ai/config");
    /// assert!(report.passes.is_empty());
    /// ```
    pub fn missing_credential(model: &str, files_considered: usize) -> Self {
        let finding = Finding::new(
            CONFIG_RULE,
            Severity::Info,
            ".",
            "No API key configured, AI review skipped. Set llm.api_key in .prism.toml \
             or export PRISM_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY.",
        );
        Self {
            findings: vec![finding],
            passes: Vec::new(),
            model: model.to_string(),
            generated_at: Utc::now(),
            stats: ReviewStats {
                findings_before_dedup: 1,
                findings_after_dedup: 1,
                files_considered,
            },
        }
    }

    /// Per-pass list of included files, for verbose output.
    pub fn inclusion_summary(&self) -> String {
        let mut out = String::new();
        for pass in &self.passes {
            out.push_str(&format!(
                "{} ({} files, ~{} tokens)\n",
                pass.pass,
                pass.included.len(),
                pass.token_estimate
            ));
            for file in &pass.included {
                let sliced = if file.sliced { " [sliced]" } else { "" };
                out.push_str(&format!(
                    "  {} ({} bytes, ~{} tokens){sliced}: {}\n",
                    file.path, file.bytes, file.tokens, file.reason
                ));
            }
        }
        out
    }

    /// Render the report as markdown.
    ///
    /// # Examples
    ///
    /// ```
    /// use prism_review::pipeline::ReviewReport;
    ///
    /// let md = ReviewReport::missing_credential("gpt-4o", 0).to_markdown();
    /// assert!(md.contains("# Review Results"));
    /// assert!(md.contains("`ai/config`"));
    /// ```
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# Review Results\n\n");
        out.push_str(&format!(
            "**Model:** {} | **Files:** {} | **Findings:** {} (before dedup: {})\n\n",
            self.model,
            self.stats.files_considered,
            self.findings.len(),
            self.stats.findings_before_dedup,
        ));

        if !self.passes.is_empty() {
            out.push_str("## Passes\n\n");
            for pass in &self.passes {
                out.push_str(&format!(
                    "- **{}** ({} files, ~{} tokens): {}\n",
                    pass.pass,
                    pass.included.len(),
                    pass.token_estimate,
                    pass.summary
                ));
            }
            out.push('\n');
        }

        if self.findings.is_empty() {
            out.push_str("No issues found.\n");
            return out;
        }

        out.push_str("## Findings\n\n");
        for f in &self.findings {
            let emoji = match f.severity {
                Severity::Error => "\u{1f6a8}",
                Severity::Warning => "\u{26a0}\u{fe0f}",
                Severity::Info => "\u{2139}\u{fe0f}",
                Severity::Hint => "\u{1f4a1}",
            };
            out.push_str(&format!(
                "### {emoji} {} `{}` in `{}`\n\n",
                severity_title(f.severity),
                f.rule_id,
                location(f),
            ));
            out.push_str(&format!("{}\n\n", f.message));
            if let Some(s) = &f.suggestion {
                out.push_str(&format!("> **Suggestion:** {s}\n\n"));
            }
        }
        out
    }
}

impl fmt::Display for ReviewReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Review Results")?;
        writeln!(f, "==============")?;
        writeln!(
            f,
            "Model: {} | Files: {} | Findings: {} (before dedup: {})\n",
            self.model,
            self.stats.files_considered,
            self.findings.len(),
            self.stats.findings_before_dedup,
        )?;

        for pass in &self.passes {
            writeln!(
                f,
                "{}: {} files, ~{} tokens, {} findings",
                pass.pass,
                pass.included.len(),
                pass.token_estimate,
                pass.findings.len()
            )?;
            writeln!(f, "  {}", pass.summary)?;
        }
        if !self.passes.is_empty() {
            writeln!(f)?;
        }

        if self.findings.is_empty() {
            writeln!(f, "No issues found.")?;
            return Ok(());
        }
        for finding in &self.findings {
            let label = match finding.severity {
                Severity::Error => "ERROR",
                Severity::Warning => "WARNING",
                Severity::Info => "INFO",
                Severity::Hint => "HINT",
            };
            writeln!(f, "[{label}] {} ({})", location(finding), finding.rule_id)?;
            writeln!(f, "  {}", finding.message)?;
            if let Some(s) = &finding.suggestion {
                writeln!(f, "  Suggestion: {s}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn severity_title(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "Error",
        Severity::Warning => "Warning",
        Severity::Info => "Info",
        Severity::Hint => "Hint",
    }
}

fn location(finding: &Finding) -> String {
    match finding.line {
        Some(line) => format!("{}:{line}", finding.file),
        None => finding.file.clone(),
    }
}

/// Everything the passes read. Built once, shared by all passes.
#[derive(Clone, Copy)]
pub struct ReviewInput<'a> {
    pub graph: &'a DependencyGraph,
    pub files: &'a FileSet,
    pub frameworks: &'a FrameworkInfo,
    /// Findings from static analysis run before the review.
    pub static_findings: &'a [Finding],
}

type ProgressFn = Box<dyn Fn(PassKind) + Send + Sync>;

/// Runs the architecture, deep-dive and security passes in order.
///
/// Each pass gets its own budgeted context and one chat exchange. Findings
/// from earlier passes are shown to later ones, and the combined list is
/// deduplicated at the end.
pub struct ReviewPipeline {
    provider: Box<dyn ChatProvider>,
    model: ModelConfig,
    config: ReviewConfig,
    on_pass: Option<ProgressFn>,
}

impl ReviewPipeline {
    pub fn new(provider: Box<dyn ChatProvider>, model: ModelConfig, config: ReviewConfig) -> Self {
        Self {
            provider,
            model,
            config,
            on_pass: None,
        }
    }

    /// Call `f` as each pass starts.
    pub fn with_progress(mut self, f: impl Fn(PassKind) + Send + Sync + 'static) -> Self {
        self.on_pass = Some(Box::new(f));
        self
    }

    /// Run all passes. Provider and parse failures end up in the report,
    /// never as an error.
    pub async fn run(&self, input: &ReviewInput<'_>) -> ReviewReport {
        let builder = ContextBuilder::new(
            input.graph,
            input.files,
            input.frameworks,
            self.config.slice_max_chars,
        );

        let mut passes: Vec<PassResult> = Vec::with_capacity(PassKind::ALL.len());
        let mut collected: Vec<Finding> = Vec::new();
        let mut aborted = false;

        for pass in PassKind::ALL {
            if aborted {
                tracing::info!(pass = %pass, "pass skipped after provider failure");
                passes.push(PassResult::empty(
                    pass,
                    format!("Skipped {pass} review after an earlier provider failure."),
                ));
                continue;
            }
            if let Some(on_pass) = &self.on_pass {
                on_pass(pass);
            }

            let context = match pass {
                PassKind::Architecture => builder.architecture(self.config.architecture_budget),
                PassKind::DeepDive => {
                    let architecture: Vec<Finding> = collected
                        .iter()
                        .filter(|f| f.rule_id.starts_with(PassKind::Architecture.rule_prefix()))
                        .cloned()
                        .collect();
                    builder.deep_dive(self.config.deep_dive_budget, input.static_findings, &architecture)
                }
                PassKind::Security => builder.security(self.config.security_budget, input.static_findings),
            };

            let prior: Vec<Finding> = input
                .static_findings
                .iter()
                .chain(collected.iter().filter(|f| f.rule_id != PROVIDER_RULE))
                .cloned()
                .collect();

            let (result, failed) = self.run_pass(context, input.frameworks, &prior).await;
            aborted = failed && self.config.abort_on_provider_error;
            collected.extend(result.findings.iter().cloned());
            passes.push(result);
        }

        let findings_before_dedup = collected.len();
        let findings = deduplicate(collected);
        tracing::info!(
            before = findings_before_dedup,
            after = findings.len(),
            "review complete"
        );

        ReviewReport {
            stats: ReviewStats {
                findings_before_dedup,
                findings_after_dedup: findings.len(),
                files_considered: input.graph.len(),
            },
            findings,
            passes,
            model: self.model.model.clone(),
            generated_at: Utc::now(),
        }
    }

    /// Returns the pass result and whether the provider failed.
    async fn run_pass(
        &self,
        context: ReviewContext,
        frameworks: &FrameworkInfo,
        prior: &[Finding],
    ) -> (PassResult, bool) {
        let pass = context.pass;
        let included: Vec<InclusionRecord> = context.files.iter().map(InclusionRecord::from).collect();
        let token_estimate = context.metadata.token_estimate;

        if context.files.is_empty() {
            tracing::info!(pass = %pass, "no files selected, skipping exchange");
            let mut result =
                PassResult::empty(pass, format!("No files selected for {pass} review; pass skipped."));
            result.token_estimate = token_estimate;
            return (result, false);
        }

        tracing::info!(pass = %pass, files = included.len(), tokens = token_estimate, "starting pass");
        let system = prompt::system_prompt(pass);
        let user = prompt::user_prompt(&context, frameworks, prior);

        match self.provider.chat(&system, &user, &self.model).await {
            Ok(text) => {
                let parsed = prompt::parse_pass_response(pass, &text);
                tracing::info!(pass = %pass, findings = parsed.findings.len(), "pass finished");
                let result = PassResult {
                    pass,
                    findings: parsed.findings,
                    summary: parsed.summary,
                    included,
                    token_estimate,
                };
                (result, false)
            }
            Err(err) => {
                tracing::warn!(pass = %pass, error = %err, "provider exchange failed");
                let finding = Finding::new(
                    PROVIDER_RULE,
                    Severity::Warning,
                    ".",
                    format!("The {pass} review pass failed: {err}"),
                );
                let result = PassResult {
                    pass,
                    findings: vec![finding],
                    summary: format!("{pass} review failed: {err}"),
                    included,
                    token_estimate,
                };
                (result, true)
            }
        }
    }
}

/// Run a review with the configured OpenAI-compatible client, calling
/// `on_pass` as each pass starts.
///
/// A missing API key yields [`ReviewReport::missing_credential`] rather
/// than an error.
///
/// # Errors
///
/// Returns [`PrismError::Provider`] if the HTTP client cannot be built.
pub async fn run_review(
    config: &PrismConfig,
    input: &ReviewInput<'_>,
    on_pass: impl Fn(PassKind) + Send + Sync + 'static,
) -> Result<ReviewReport, PrismError> {
    let Some(api_key) = config.llm.resolve_api_key() else {
        tracing::warn!("no API key configured, skipping AI review");
        return Ok(ReviewReport::missing_credential(&config.llm.model, input.graph.len()));
    };
    let client = LlmClient::new(&config.llm, api_key)?;
    let pipeline = ReviewPipeline::new(
        Box::new(client),
        ModelConfig::from(&config.llm),
        config.review.clone(),
    )
    .with_progress(on_pass);
    Ok(pipeline.run(input).await)
}

//! Token-budgeted context selection for each review pass.
//!
//! Each pass has its own policy, but all share [`build_context_file`] for
//! deciding whether a file goes in whole, sliced, or not at all. Policies
//! never evict a file once admitted; a candidate that does not fit is
//! skipped and selection moves on.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use prism_core::{FileCategory, Finding, FrameworkInfo, PassKind};
use prism_graph::graph::{DependencyGraph, GraphNode};
use prism_graph::slice::{extract_slices, CodeSlice, SliceOptions};
use prism_graph::source::FileSet;
use prism_graph::tokens::estimate_tokens;
use regex::Regex;
use serde::Serialize;

/// Files at or above this size are always considered for slicing.
const FULL_CONTENT_MAX_BYTES: u64 = 50 * 1024;

const MANIFESTS: [&str; 3] = ["package.json", "pyproject.toml", "requirements.txt"];
const MAX_ENTRY_POINTS: usize = 5;
const MAX_CONFIG_FILES: usize = 5;
const MAX_CONNECTED_FILES: usize = 10;
const MIN_IMPORTERS_FOR_CONNECTIVITY: usize = 3;

const SECURITY_PATH_KEYWORDS: [&str; 15] = [
    "auth",
    "login",
    "logout",
    "password",
    "token",
    "secret",
    "crypto",
    "session",
    "permission",
    "admin",
    "security",
    "oauth",
    "jwt",
    "credential",
    "middleware",
];

const ENV_SAMPLE_FILES: [&str; 2] = [".env.example", ".env.sample"];

fn config_file_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^config[\w.-]*\.(?:ts|js|json)$").expect("config name regex compiles"))
}

fn data_layer_path() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:^|[/._-])(?:db|database|models?|schemas?|migrations?|quer(?:y|ies)|repositor(?:y|ies)|prisma)(?:[/._-]|$)")
            .expect("data layer regex compiles")
    })
}

/// File text as sent to the model: the whole file or selected ranges.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ContextContent {
    Full(String),
    Sliced(Vec<CodeSlice>),
}

/// One file admitted into a pass's context.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextFile {
    pub path: String,
    pub content: ContextContent,
    /// Why the file was selected.
    pub reason: String,
    pub priority: i64,
    /// File size in bytes.
    pub size: u64,
    /// Estimated token cost of the included content.
    pub tokens: usize,
}

impl ContextFile {
    pub fn is_sliced(&self) -> bool {
        matches!(self.content, ContextContent::Sliced(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMetadata {
    /// Files in the repository, whether or not they were included.
    pub total_files: usize,
    /// Estimated tokens of everything counted against the budget.
    pub token_estimate: usize,
    pub frameworks: Vec<String>,
    pub focus_areas: Vec<String>,
    /// Every file path, sorted. Only set for the architecture pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_file_tree: Option<Vec<String>>,
}

/// The curated input for one review pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewContext {
    pub pass: PassKind,
    pub files: Vec<ContextFile>,
    pub metadata: ContextMetadata,
}

/// Per-file inclusion summary reported alongside a pass result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusionRecord {
    pub path: String,
    pub reason: String,
    pub bytes: u64,
    pub tokens: usize,
    pub sliced: bool,
}

impl From<&ContextFile> for InclusionRecord {
    fn from(file: &ContextFile) -> Self {
        Self {
            path: file.path.clone(),
            reason: file.reason.clone(),
            bytes: file.size,
            tokens: file.tokens,
            sliced: file.is_sliced(),
        }
    }
}

/// Decide how a file enters the context, given `remaining` tokens.
///
/// Small files that fit go in whole. Otherwise the file is sliced with a
/// character cap of `min(remaining * 4, slice_max_chars)`. Returns `None`
/// when slicing finds nothing or the slices still do not fit. Slices
/// costing at least 80% of the whole file are replaced by the whole file
/// when it fits.
///
/// # Examples
///
/// ```
/// use prism_review::context::{build_context_file, ContextContent, FileCandidate};
///
/// let candidate = FileCandidate {
///     path: "src/a.ts",
///     content: "export const a = 1;\n",
///     size: 20,
///     priority: 10,
/// };
/// let file = build_context_file(&candidate, "Entry point", 1_000, 20_000, &[]).unwrap();
/// assert!(matches!(file.content, ContextContent::Full(_)));
/// assert_eq!(file.tokens, 5);
///
/// assert!(build_context_file(&candidate, "Entry point", 0, 20_000, &[]).is_none());
/// ```
pub fn build_context_file(
    candidate: &FileCandidate<'_>,
    reason: &str,
    remaining: usize,
    slice_max_chars: usize,
    findings: &[Finding],
) -> Option<ContextFile> {
    let full_tokens = estimate_tokens(candidate.content);
    let full = || ContextFile {
        path: candidate.path.to_string(),
        content: ContextContent::Full(candidate.content.to_string()),
        reason: reason.to_string(),
        priority: candidate.priority,
        size: candidate.size,
        tokens: full_tokens,
    };

    if candidate.size < FULL_CONTENT_MAX_BYTES && full_tokens <= remaining {
        return Some(full());
    }

    let options = SliceOptions {
        findings,
        max_total_chars: remaining.saturating_mul(4).min(slice_max_chars),
        ..SliceOptions::default()
    };
    let slices = extract_slices(candidate.content, candidate.path, &options);
    if slices.is_empty() {
        return None;
    }

    let slice_tokens: usize = slices.iter().map(|s| estimate_tokens(&s.content)).sum();
    if slice_tokens > remaining {
        return None;
    }
    if slice_tokens * 5 >= full_tokens * 4 && full_tokens <= remaining {
        return Some(full());
    }

    Some(ContextFile {
        path: candidate.path.to_string(),
        content: ContextContent::Sliced(slices),
        reason: format!("{reason} (sliced)"),
        priority: candidate.priority,
        size: candidate.size,
        tokens: slice_tokens,
    })
}

/// Inputs to [`build_context_file`] for one file.
#[derive(Debug, Clone, Copy)]
pub struct FileCandidate<'a> {
    pub path: &'a str,
    pub content: &'a str,
    pub size: u64,
    pub priority: i64,
}

/// Builds the [`ReviewContext`] for each pass from the shared graph and
/// content cache.
pub struct ContextBuilder<'a> {
    graph: &'a DependencyGraph,
    files: &'a FileSet,
    frameworks: &'a FrameworkInfo,
    slice_max_chars: usize,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(
        graph: &'a DependencyGraph,
        files: &'a FileSet,
        frameworks: &'a FrameworkInfo,
        slice_max_chars: usize,
    ) -> Self {
        Self {
            graph,
            files,
            frameworks,
            slice_max_chars,
        }
    }

    /// Repository shape: file tree, manifests, entry points, configuration
    /// and the README.
    ///
    /// The file tree is always counted against the budget, even when it
    /// alone exceeds it.
    pub fn architecture(&self, budget: usize) -> ReviewContext {
        let tree = self.graph.sorted_paths();
        let mut selection = Selection::new(self, budget, &[]);
        selection.used = estimate_tokens(&tree.join("\n"));

        for manifest in MANIFESTS {
            if self.graph.contains(manifest) {
                selection.try_add(manifest, "Package configuration");
            }
        }

        let entries = self.by_priority(self.graph.entry_points());
        selection.add_up_to(&entries, MAX_ENTRY_POINTS, |_| "Entry point".to_string());

        let configs = self.by_priority(self.graph.config_files());
        selection.add_up_to(&configs, MAX_CONFIG_FILES, |_| "Configuration".to_string());

        if let Some(readme) = find_readme(&tree) {
            selection.try_add(readme, "Project documentation");
        }

        selection.finish(
            PassKind::Architecture,
            &["architecture", "module boundaries", "dependency structure", "coupling"],
            Some(tree),
        )
    }

    /// Implementation detail: statically flagged files, files the
    /// architecture pass pointed at, hubs, then the highest-priority rest
    /// up to 90% of the budget.
    pub fn deep_dive(
        &self,
        budget: usize,
        static_findings: &[Finding],
        architecture_findings: &[Finding],
    ) -> ReviewContext {
        let mut selection = Selection::new(self, budget, static_findings);

        let mut flagged: Vec<&str> = Vec::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for finding in static_findings {
            let count = counts.entry(finding.file.as_str()).or_insert(0);
            if *count == 0 {
                flagged.push(finding.file.as_str());
            }
            *count += 1;
        }
        flagged.sort_by_key(|path| std::cmp::Reverse(counts.get(path).copied().unwrap_or(0)));
        for path in flagged {
            let count = counts.get(path).copied().unwrap_or(0);
            let plural = if count == 1 { "" } else { "s" };
            selection.try_add(path, &format!("{count} static analysis finding{plural}"));
        }

        for finding in architecture_findings {
            if finding.rule_id.starts_with("ai/arch") {
                selection.try_add(&finding.file, "Flagged by architecture review");
            }
        }

        let hubs: Vec<&GraphNode> = self
            .graph
            .sorted_by_priority()
            .into_iter()
            .filter(|n| n.imported_by.len() >= MIN_IMPORTERS_FOR_CONNECTIVITY && !is_test_or_config(n))
            .collect();
        selection.add_up_to(&hubs, MAX_CONNECTED_FILES, |n| {
            format!("High connectivity ({} importers)", n.imported_by.len())
        });

        selection.limit = budget * 9 / 10;
        for node in self.graph.sorted_by_priority() {
            if selection.used >= selection.limit {
                break;
            }
            if is_test_or_config(node) {
                continue;
            }
            selection.try_add(&node.path, &format!("High priority {} file", node.category));
        }

        selection.finish(
            PassKind::DeepDive,
            &["logic errors", "error handling", "edge cases", "performance"],
            None,
        )
    }

    /// Attack surface: API handlers, security-named paths, environment
    /// samples and config files, then the data layer up to 90% of the budget.
    pub fn security(&self, budget: usize, static_findings: &[Finding]) -> ReviewContext {
        let mut selection = Selection::new(self, budget, static_findings);

        let api = self.by_priority(self.graph.api_files());
        for node in api {
            selection.try_add(&node.path, "API endpoint");
        }

        for node in self.graph.sorted_by_priority() {
            // tests under security-named paths are fixtures, not attack surface
            if node.category == FileCategory::Test {
                continue;
            }
            let lower = node.path.to_lowercase();
            if let Some(keyword) = SECURITY_PATH_KEYWORDS.iter().find(|k| lower.contains(*k)) {
                selection.try_add(&node.path, &format!("Security-sensitive path ({keyword})"));
            }
        }

        for node in self.graph.nodes() {
            let name = file_name(&node.path).to_lowercase();
            if ENV_SAMPLE_FILES.contains(&name.as_str()) || config_file_name().is_match(&name) {
                selection.try_add(&node.path, "Environment and configuration");
            }
        }

        selection.limit = budget * 9 / 10;
        for node in self.graph.sorted_by_priority() {
            if selection.used >= selection.limit {
                break;
            }
            if node.category != FileCategory::Test && data_layer_path().is_match(&node.path) {
                selection.try_add(&node.path, "Data access layer");
            }
        }

        selection.finish(
            PassKind::Security,
            &["injection", "authentication", "authorization", "secrets exposure", "unsafe input handling"],
            None,
        )
    }

    fn by_priority(&self, paths: &[String]) -> Vec<&'a GraphNode> {
        let mut nodes: Vec<&GraphNode> = paths.iter().filter_map(|p| self.graph.get(p)).collect();
        nodes.sort_by_key(|n| std::cmp::Reverse(n.score()));
        nodes
    }
}

/// Running state of one pass's selection.
struct Selection<'b, 'a> {
    builder: &'b ContextBuilder<'a>,
    findings: &'b [Finding],
    budget: usize,
    /// Effective ceiling for new admissions; lowered for the final fill step.
    limit: usize,
    used: usize,
    files: Vec<ContextFile>,
    seen: HashSet<String>,
}

impl<'b, 'a> Selection<'b, 'a> {
    fn new(builder: &'b ContextBuilder<'a>, budget: usize, findings: &'b [Finding]) -> Self {
        Self {
            builder,
            findings,
            budget,
            limit: budget,
            used: 0,
            files: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.used)
    }

    /// Admit `path` if it is new and fits. Returns whether it was admitted.
    fn try_add(&mut self, path: &str, reason: &str) -> bool {
        if self.seen.contains(path) {
            return false;
        }
        let Some(node) = self.builder.graph.get(path) else {
            return false;
        };
        let Some(content) = self.builder.files.content(path) else {
            return false;
        };

        let candidate = FileCandidate {
            path,
            content: &content,
            size: node.size,
            priority: node.score(),
        };
        let file = build_context_file(
            &candidate,
            reason,
            self.remaining(),
            self.builder.slice_max_chars,
            self.findings,
        );
        match file {
            Some(file) => {
                tracing::debug!(
                    file = %path,
                    tokens = file.tokens,
                    sliced = file.is_sliced(),
                    reason = %file.reason,
                    "file admitted"
                );
                self.used += file.tokens;
                self.seen.insert(path.to_string());
                self.files.push(file);
                true
            }
            None => {
                tracing::debug!(file = %path, remaining = self.remaining(), "file does not fit");
                false
            }
        }
    }

    /// Try candidates in order until `max` have been admitted.
    fn add_up_to(
        &mut self,
        candidates: &[&GraphNode],
        max: usize,
        reason: impl Fn(&GraphNode) -> String,
    ) {
        let mut admitted = 0;
        for node in candidates {
            if admitted == max {
                break;
            }
            if self.try_add(&node.path, &reason(*node)) {
                admitted += 1;
            }
        }
    }

    fn finish(
        self,
        pass: PassKind,
        focus_areas: &[&str],
        full_file_tree: Option<Vec<String>>,
    ) -> ReviewContext {
        tracing::debug!(
            pass = %pass,
            files = self.files.len(),
            tokens = self.used,
            budget = self.budget,
            "context built"
        );
        ReviewContext {
            pass,
            files: self.files,
            metadata: ContextMetadata {
                total_files: self.builder.graph.len(),
                token_estimate: self.used,
                frameworks: self.builder.frameworks.names(),
                focus_areas: focus_areas.iter().map(|s| s.to_string()).collect(),
                full_file_tree,
            },
        }
    }
}

fn is_test_or_config(node: &GraphNode) -> bool {
    matches!(node.category, FileCategory::Test | FileCategory::Config)
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// The README closest to the repository root.
fn find_readme(sorted_paths: &[String]) -> Option<&str> {
    sorted_paths
        .iter()
        .filter(|p| {
            let name = file_name(p).to_lowercase();
            name == "readme" || name.starts_with("readme.")
        })
        .min_by_key(|p| p.matches('/').count())
        .map(String::as_str)
}

use std::fmt::Write as _;

use prism_core::{Finding, FrameworkInfo, PassKind, Severity};
use serde_json::{Map, Value};

use crate::context::{ContextContent, ReviewContext};

/// Characters of raw response quoted when parsing fails.
const DIAGNOSTIC_CHARS: usize = 200;

/// Prior findings listed in a prompt, at most.
const MAX_PRIOR_FINDINGS: usize = 50;

const RESPONSE_FORMAT: &str = "\
Respond with a single JSON object and nothing else:
{
  \"summary\": \"Two or three sentences on what you reviewed and the overall state\",
  \"findings\": [
    {
      \"ruleId\": \"short-kebab-case-rule\",
      \"severity\": \"error\" | \"warning\" | \"info\" | \"hint\",
      \"file\": \"relative/path/to/file.ts\",
      \"line\": 42,
      \"message\": \"Clear explanation of the issue\",
      \"suggestion\": \"Optional concrete fix\"
    }
  ]
}

If you find no issues, return an empty findings array.";

const ARCHITECTURE_PROMPT: &str = "\
You are Prism, a senior software architect reviewing a codebase.

You receive the complete file tree and a curated set of files: manifests, \
entry points, configuration and documentation. Assess the system as a whole.

Focus on:
- Module boundaries and layering violations
- Dependency direction and coupling between components
- Inconsistent or missing structure (error handling strategy, configuration, entry points)
- Design decisions that will make the code hard to change or test

Rules:
- The file tree lists every file in the repository. Never report a file as missing if it appears there
- Only report issues supported by the files and tree you were given
- Prefer a few high-impact findings over many minor ones
- Use the file the issue is most visible in; omit the line if no single line applies";

const DEEP_DIVE_PROMPT: &str = "\
You are Prism, an expert code reviewer performing a detailed implementation review.

You receive selected files, some of them as line-numbered slices of larger files. \
Earlier findings from static analysis and an architecture review are listed for context.

Focus on:
- Logic errors and incorrect edge-case handling
- Error handling that swallows, misreports or leaks failures
- Resource leaks, race conditions and unbounded work
- Places where an earlier finding points at a deeper defect

Rules:
- Only report issues you are CERTAIN about from the code shown
- Reference line numbers from the file or slice headers
- Do not repeat earlier findings unless you add new information
- Do not comment on style or naming unless it causes a bug";

const SECURITY_PROMPT: &str = "\
You are Prism, an application security reviewer.

You receive the attack surface of the codebase: API handlers, authentication and \
session code, configuration, environment samples and the data layer. Earlier \
findings are listed for context.

Focus on:
- Injection (SQL, command, template, path traversal)
- Broken authentication, session handling and authorization checks
- Hard-coded secrets, weak cryptography and insecure token handling
- Unsafe handling of untrusted input, permissive CORS and missing validation

Rules:
- Only report vulnerabilities with a plausible exploit path in the code shown
- Use severity error for exploitable issues and warning for hardening gaps
- Reference line numbers from the file or slice headers";

/// System prompt for `pass`, including the response format.
///
/// # Examples
///
/// ```
/// use prism_core::PassKind;
/// use prism_review::prompt::system_prompt;
///
/// let prompt = system_prompt(PassKind::Security);
/// assert!(prompt.contains("security reviewer"));
/// assert!(prompt.contains("\"findings\""));
/// ```
pub fn system_prompt(pass: PassKind) -> String {
    let role = match pass {
        PassKind::Architecture => ARCHITECTURE_PROMPT,
        PassKind::DeepDive => DEEP_DIVE_PROMPT,
        PassKind::Security => SECURITY_PROMPT,
    };
    format!("{role}\n\n{RESPONSE_FORMAT}")
}

/// User prompt: project metadata, the file tree for the architecture pass,
/// prior findings, then every included file with its selection reason.
pub fn user_prompt(context: &ReviewContext, frameworks: &FrameworkInfo, prior: &[Finding]) -> String {
    let mut out = String::new();
    let meta = &context.metadata;

    let _ = writeln!(out, "# {} review\n", context.pass);
    let _ = writeln!(out, "Project: {}", frameworks.label());
    if !meta.focus_areas.is_empty() {
        let _ = writeln!(out, "Focus: {}", meta.focus_areas.join(", "));
    }
    let _ = writeln!(
        out,
        "Files in repository: {} | Files included: {}\n",
        meta.total_files,
        context.files.len()
    );

    if let Some(tree) = &meta.full_file_tree {
        let _ = writeln!(out, "## File tree\n");
        let _ = writeln!(
            out,
            "These are ALL {} files in the repository. Files not listed here do not exist.\n",
            tree.len()
        );
        out.push_str("```\n");
        for path in tree {
            let _ = writeln!(out, "{path}");
        }
        out.push_str("```\n\n");
    }

    if !prior.is_empty() {
        let _ = writeln!(out, "## Earlier findings\n");
        for f in prior.iter().take(MAX_PRIOR_FINDINGS) {
            let location = match f.line {
                Some(line) => format!("{}:{line}", f.file),
                None => f.file.clone(),
            };
            let _ = writeln!(out, "- [{}] {location} ({}): {}", f.severity, f.rule_id, f.message);
        }
        if prior.len() > MAX_PRIOR_FINDINGS {
            let _ = writeln!(out, "- ... and {} more", prior.len() - MAX_PRIOR_FINDINGS);
        }
        out.push('\n');
    }

    let _ = writeln!(out, "## Files\n");
    for file in &context.files {
        let lang = fence_language(&file.path);
        let _ = writeln!(out, "### {}", file.path);
        let _ = writeln!(out, "Reason: {}\n", file.reason);
        match &file.content {
            ContextContent::Full(text) => {
                let _ = writeln!(out, "```{lang}\n{text}\n```\n");
            }
            ContextContent::Sliced(slices) => {
                for slice in slices {
                    let _ = writeln!(
                        out,
                        "Lines {}-{} ({}):\n```{lang}\n{}\n```\n",
                        slice.start_line, slice.end_line, slice.reason, slice.content
                    );
                }
            }
        }
    }

    out
}

fn fence_language(path: &str) -> &'static str {
    match prism_core::extension_of(path).as_str() {
        "ts" | "tsx" | "mts" | "cts" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "py" => "python",
        "json" => "json",
        "toml" => "toml",
        "md" => "markdown",
        "yml" | "yaml" => "yaml",
        _ => "",
    }
}

/// Findings and summary recovered from a model response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub findings: Vec<Finding>,
    pub summary: String,
}

/// Parse a pass response. Never fails.
///
/// Accepts a bare JSON object, one wrapped in a code fence, or one embedded
/// in prose. Anything else yields no findings and a summary quoting the
/// start of the response.
///
/// # Examples
///
/// ```
/// use prism_core::{PassKind, Severity};
/// use prism_review::prompt::parse_pass_response;
///
/// let text = "Here you go:\n```json\n{\"summary\":\"ok\",\"findings\":[{\"ruleId\":\"layering\",\"severity\":\"high\",\"file\":\"src/a.ts\",\"line\":3,\"message\":\"UI imports DB\"}]}\n```";
/// let parsed = parse_pass_response(PassKind::Architecture, text);
/// assert_eq!(parsed.summary, "ok");
/// assert_eq!(parsed.findings[0].rule_id, "ai/arch/layering");
/// assert_eq!(parsed.findings[0].severity, Severity::Error);
///
/// let bad = parse_pass_response(PassKind::Security, "not json");
/// assert!(bad.findings.is_empty());
/// ```
pub fn parse_pass_response(pass: PassKind, text: &str) -> ParsedResponse {
    let object = first_json_object(strip_code_fences(text)).or_else(|| first_json_object(text));
    let Some(Value::Object(object)) = object else {
        tracing::warn!(pass = %pass, "model response contained no JSON object");
        return ParsedResponse {
            findings: Vec::new(),
            summary: format!("Could not parse {pass} response: {}", truncate(text.trim())),
        };
    };

    let findings: Vec<Finding> = object
        .get("findings")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|item| finding_from(pass, item))
                .collect()
        })
        .unwrap_or_default();

    let summary = str_field(&object, &["summary"])
        .map(str::to_string)
        .unwrap_or_else(|| format!("{pass} review reported {} finding(s).", findings.len()));

    ParsedResponse { findings, summary }
}

fn finding_from(pass: PassKind, item: &Map<String, Value>) -> Finding {
    let prefix = pass.rule_prefix();
    let rule_id = match str_field(item, &["ruleId", "rule_id", "rule", "id"]) {
        Some(rule) if rule.starts_with("ai/") => rule.to_string(),
        Some(rule) => format!("{prefix}/{rule}"),
        None => format!("{prefix}/unspecified"),
    };
    let severity = str_field(item, &["severity", "level"])
        .map(Severity::from_loose)
        .unwrap_or(Severity::Info);
    let file = str_field(item, &["file", "path", "filePath"]).unwrap_or("unknown");
    let message =
        str_field(item, &["message", "description"]).unwrap_or("No description provided");

    let mut finding = Finding::new(rule_id, severity, file, message);
    if let Some(line) = item.get("line").and_then(line_number) {
        finding = finding.at_line(line);
    }
    if let Some(suggestion) = str_field(item, &["suggestion", "fix"]) {
        finding = finding.with_suggestion(suggestion);
    }
    finding
}

/// First non-empty string value among `keys`.
fn str_field<'v>(map: &'v Map<String, Value>, keys: &[&str]) -> Option<&'v str> {
    keys.iter()
        .filter_map(|k| map.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn line_number(value: &Value) -> Option<u32> {
    let n = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    u32::try_from(n).ok().filter(|&l| l > 0)
}

/// Body of the first fenced block, or the trimmed input if there is none.
fn strip_code_fences(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text.trim();
    };
    let after = &text[open + 3..];
    let body = match after.find('\n') {
        Some(idx) => &after[idx + 1..],
        None => after,
    };
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// First `{ ... }` span that balances and parses as a JSON object.
fn first_json_object(text: &str) -> Option<Value> {
    for (start, _) in text.match_indices('{') {
        let Some(len) = balanced_len(&text[start..]) else {
            continue;
        };
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&text[start..start + len]) {
            return Some(value);
        }
    }
    None
}

/// Byte length of the brace-balanced prefix of `text`, skipping braces
/// inside JSON strings.
fn balanced_len(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= DIAGNOSTIC_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(DIAGNOSTIC_CHARS).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextFile, ContextMetadata};
    use prism_graph::slice::CodeSlice;

    fn context(pass: PassKind, tree: Option<Vec<String>>) -> ReviewContext {
        ReviewContext {
            pass,
            files: vec![
                ContextFile {
                    path: "src/index.ts".into(),
                    content: ContextContent::Full("console.log(1);".into()),
                    reason: "Entry point".into(),
                    priority: 100,
                    size: 15,
                    tokens: 4,
                },
                ContextFile {
                    path: "src/big.py".into(),
                    content: ContextContent::Sliced(vec![CodeSlice {
                        start_line: 40,
                        end_line: 42,
                        content: "a\nb\nc".into(),
                        reason: "security: credentials".into(),
                    }]),
                    reason: "Keyword (sliced)".into(),
                    priority: 50,
                    size: 90_000,
                    tokens: 2,
                },
            ],
            metadata: ContextMetadata {
                total_files: 12,
                token_estimate: 6,
                frameworks: vec!["next".into()],
                focus_areas: vec!["architecture".into()],
                full_file_tree: tree,
            },
        }
    }

    #[test]
    fn architecture_prompt_lists_full_tree() {
        let ctx = context(PassKind::Architecture, Some(vec!["a.ts".into(), "b.ts".into()]));
        let prompt = user_prompt(&ctx, &FrameworkInfo::default(), &[]);
        assert!(prompt.contains("These are ALL 2 files"));
        assert!(prompt.contains("a.ts\nb.ts\n"));
        assert!(prompt.contains("```typescript\nconsole.log(1);\n```"));
        assert!(prompt.contains("Lines 40-42 (security: credentials):\n```python\na\nb\nc\n```"));
    }

    #[test]
    fn later_prompts_list_prior_findings() {
        let ctx = context(PassKind::DeepDive, None);
        let prior = vec![Finding::new("lint/x", Severity::Warning, "src/a.ts", "unused").at_line(7)];
        let prompt = user_prompt(&ctx, &FrameworkInfo::default(), &prior);
        assert!(!prompt.contains("File tree"));
        assert!(prompt.contains("- [warning] src/a.ts:7 (lint/x): unused"));
    }

    #[test]
    fn each_pass_has_its_own_system_prompt() {
        assert!(system_prompt(PassKind::Architecture).contains("architect"));
        assert!(system_prompt(PassKind::DeepDive).contains("implementation review"));
        assert!(system_prompt(PassKind::Security).contains("Injection"));
    }

    #[test]
    fn parses_bare_object() {
        let text = r#"{"summary":"fine","findings":[]}"#;
        let parsed = parse_pass_response(PassKind::DeepDive, text);
        assert_eq!(parsed.summary, "fine");
        assert!(parsed.findings.is_empty());
    }

    #[test]
    fn parses_object_in_prose_with_braces_in_strings() {
        let text = r#"Sure! {"findings":[{"ruleId":"x","message":"use {} carefully \" }","file":"a.ts"}]} Hope this helps {"#;
        let parsed = parse_pass_response(PassKind::DeepDive, text);
        assert_eq!(parsed.findings.len(), 1);
        assert_eq!(parsed.findings[0].message, "use {} carefully \" }");
        assert_eq!(parsed.findings[0].rule_id, "ai/deep/x");
    }

    #[test]
    fn missing_fields_get_placeholders() {
        let text = r#"{"findings":[{}]}"#;
        let parsed = parse_pass_response(PassKind::Security, text);
        let f = &parsed.findings[0];
        assert_eq!(f.rule_id, "ai/security/unspecified");
        assert_eq!(f.severity, Severity::Info);
        assert_eq!(f.file, "unknown");
        assert_eq!(f.message, "No description provided");
        assert_eq!(f.line, None);
        assert_eq!(parsed.summary, "security review reported 1 finding(s).");
    }

    #[test]
    fn severity_and_line_are_normalized() {
        let text = r#"{"findings":[
            {"ruleId":"ai/security/sqli","severity":"critical","file":"db.ts","line":"12","message":"m"},
            {"rule":"a","severity":"medium","file":"db.ts","line":0,"message":"m"},
            {"rule":"b","severity":"low","file":"db.ts","line":-3,"message":"m"},
            {"rule":"c","severity":"bogus","file":"db.ts","message":"m","suggestion":"fix"}
        ]}"#;
        let parsed = parse_pass_response(PassKind::Security, text);
        let sev: Vec<Severity> = parsed.findings.iter().map(|f| f.severity).collect();
        assert_eq!(sev, vec![Severity::Error, Severity::Warning, Severity::Info, Severity::Info]);
        assert_eq!(parsed.findings[0].rule_id, "ai/security/sqli");
        assert_eq!(parsed.findings[0].line, Some(12));
        assert_eq!(parsed.findings[1].line, None);
        assert_eq!(parsed.findings[2].line, None);
        assert_eq!(parsed.findings[3].suggestion.as_deref(), Some("fix"));
    }

    #[test]
    fn malformed_response_gets_truncated_diagnostic() {
        let text = "x".repeat(1_000);
        let parsed = parse_pass_response(PassKind::Architecture, &text);
        assert!(parsed.findings.is_empty());
        assert!(parsed.summary.starts_with("Could not parse architecture response: "));
        assert!(parsed.summary.ends_with("..."));
        assert!(parsed.summary.len() < 300);
    }

    #[test]
    fn unterminated_json_is_malformed() {
        let parsed = parse_pass_response(PassKind::DeepDive, "```json\n{\"findings\": [\n```");
        assert!(parsed.findings.is_empty());
        assert!(parsed.summary.starts_with("Could not parse"));
    }

    #[test]
    fn non_object_entries_are_skipped() {
        let parsed = parse_pass_response(PassKind::DeepDive, r#"{"findings":["oops", 3, {"message":"real"}]}"#);
        assert_eq!(parsed.findings.len(), 1);
        assert_eq!(parsed.findings[0].message, "real");
    }
}

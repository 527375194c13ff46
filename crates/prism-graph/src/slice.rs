//! Line-range extraction for files too large to send whole.
//!
//! Candidates come from four sources, tried in order: static-finding
//! windows, security-pattern windows, declaration blocks and `export`
//! blocks. A candidate is accepted only if it overlaps no accepted slice
//! and fits the remaining character budget. Accepted slices are then
//! sorted and merged, except truncated windows, which stay as cut.

use std::sync::OnceLock;

use prism_core::Finding;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Lines of context on each side of a flagged line.
const CONTEXT_LINES: usize = 10;

/// Declaration and export blocks longer than this are dropped.
const MAX_BLOCK_LINES: usize = 50;

/// Upper bound on the text of any single candidate.
const MAX_SLICE_CHARS: usize = 5_000;

const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// A contiguous 1-based, inclusive line range of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSlice {
    pub start_line: usize,
    pub end_line: usize,
    /// Literal text of the range.
    pub content: String,
    /// Why the range was selected; merged slices join reasons with `"; "`.
    pub reason: String,
}

/// Options for [`extract_slices`].
#[derive(Debug, Clone, Copy)]
pub struct SliceOptions<'a> {
    /// Static findings; only those for the sliced file are used.
    pub findings: &'a [Finding],
    pub include_security: bool,
    pub include_exports: bool,
    pub include_functions: bool,
    /// Total character budget across all slices.
    pub max_total_chars: usize,
}

impl Default for SliceOptions<'_> {
    fn default() -> Self {
        Self {
            findings: &[],
            include_security: true,
            include_exports: true,
            include_functions: true,
            max_total_chars: 20_000,
        }
    }
}

/// Security-sensitive line patterns, checked in order; the first match labels the line.
fn security_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (
                "credentials",
                r"(?i)password|passwd|\bsecret|api[_-]?key|private[_-]?key|access[_-]?key|credential",
            ),
            (
                "environment access",
                r"process\.env|os\.environ|\bgetenv\b|import\.meta\.env|dotenv",
            ),
            (
                "dynamic execution",
                r"\beval\s*\(|new\s+Function\s*\(|child_process|\bexec(?:Sync)?\s*\(|\bspawn\s*\(|subprocess\.|os\.system",
            ),
            (
                "unsafe HTML",
                r"dangerouslySetInnerHTML|\.innerHTML\s*=|\.outerHTML\s*=|document\.write|v-html|\bmark_safe\b",
            ),
            (
                "SQL query",
                r"(?i)\.query\s*\(|\.raw\s*\(|\bexecute\s*\(|\b(?:select\s.+\sfrom|insert\s+into|update\s.+\sset|delete\s+from)\b",
            ),
            (
                "cookie/session storage",
                r"(?i)document\.cookie|set-cookie|\bres\.cookie|localstorage|sessionstorage|req\.session",
            ),
            (
                "CORS configuration",
                r"(?i)\bcors\b|access-control-allow|allowed[_-]?origins|\borigin\s*:",
            ),
            (
                "auth token",
                r"(?i)\bjwt\b|jsonwebtoken|\bbearer\b|oauth|id_token|refresh_token|access_token",
            ),
            (
                "password hashing",
                r"(?i)bcrypt|argon2|scrypt|pbkdf2|createhash|hashlib|\bmd5\b|\bsha1\b",
            ),
        ]
        .into_iter()
        .map(|(label, pattern)| (label, Regex::new(pattern).expect("security pattern compiles")))
        .collect()
    })
}

/// Lines that open a declaration worth showing whole.
fn signature_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"^\s*(?:",
            r"export\s+(?:default\s+)?(?:declare\s+)?(?:async\s+)?(?:abstract\s+)?(?:const|let|var|function|class|interface|type|enum)\b",
            r"|(?:async\s+)?function\b",
            r"|(?:abstract\s+)?class\s+\w",
            r"|(?:async\s+)?def\s+\w+\s*\(",
            r"|(?:const|let|var)\s+\w+\s*=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*(?::[^=]*)?=>|\w+\s*=>)",
            r")",
        ))
        .expect("signature regex compiles")
    })
}

/// Label of the first security category `line` matches.
pub fn security_category(line: &str) -> Option<&'static str> {
    security_patterns()
        .iter()
        .find(|(_, re)| re.is_match(line))
        .map(|(label, _)| *label)
}

/// Extract relevant, non-overlapping line ranges from `content`.
///
/// Returns slices sorted by start line with adjacent ranges merged. A zero
/// character budget or empty content yields no slices.
///
/// # Examples
///
/// ```
/// use prism_graph::slice::{extract_slices, SliceOptions};
///
/// let src = "const a = 1;\nconst key = process.env.API_KEY;\nconst b = 2;\n";
/// let slices = extract_slices(src, "a.ts", &SliceOptions::default());
/// assert_eq!(slices.len(), 1);
/// assert_eq!((slices[0].start_line, slices[0].end_line), (1, 3));
/// assert!(slices[0].reason.starts_with("security: credentials"));
/// ```
pub fn extract_slices(content: &str, path: &str, options: &SliceOptions<'_>) -> Vec<CodeSlice> {
    if options.max_total_chars == 0 || content.is_empty() {
        return Vec::new();
    }
    let lines = split_lines(content);
    if lines.is_empty() {
        return Vec::new();
    }

    let mut collector = Collector::new(&lines, options.max_total_chars);

    let mut finding_lines: Vec<usize> = options
        .findings
        .iter()
        .filter(|f| f.file == path)
        .filter_map(|f| f.line)
        .map(|l| l as usize)
        .filter(|&l| l >= 1 && l <= lines.len())
        .collect();
    finding_lines.sort_unstable();
    finding_lines.dedup();
    for line in finding_lines {
        collector.offer_window(line, format!("static finding at line {line}"));
    }

    if options.include_security {
        for (idx, line) in lines.iter().enumerate() {
            if let Some(label) = security_category(line) {
                collector.offer_window(idx + 1, format!("security: {label}"));
            }
        }
    }

    if options.include_functions {
        for (idx, line) in lines.iter().enumerate() {
            if !signature_line().is_match(line) {
                continue;
            }
            if let Some(end) = block_end(&lines, idx, true) {
                collector.offer_block(idx + 1, end + 1, "declaration");
            }
        }
    }

    if options.include_exports {
        for (idx, line) in lines.iter().enumerate() {
            if !line.starts_with("export ") {
                continue;
            }
            if let Some(end) = block_end(&lines, idx, false) {
                collector.offer_block(idx + 1, end + 1, "export");
            }
        }
    }

    tracing::debug!(
        file = %path,
        slices = collector.accepted.len(),
        chars = collector.used,
        "slices extracted"
    );
    collector.finish()
}

/// Sort `slices` and merge any that overlap or touch, re-reading the
/// merged text from `content`.
///
/// # Examples
///
/// ```
/// use prism_graph::slice::{merge_slices, CodeSlice};
///
/// let content: String = (1..=30).map(|i| format!("line {i}\n")).collect();
/// let slice = |start, end, reason: &str| CodeSlice {
///     start_line: start,
///     end_line: end,
///     content: String::new(),
///     reason: reason.into(),
/// };
/// let merged = merge_slices(vec![slice(8, 20, "b"), slice(1, 10, "a")], &content);
/// assert_eq!(merged.len(), 1);
/// assert_eq!((merged[0].start_line, merged[0].end_line), (1, 20));
/// assert_eq!(merged[0].reason, "a; b");
/// assert!(merged[0].content.starts_with("line 1\n"));
/// ```
pub fn merge_slices(slices: Vec<CodeSlice>, content: &str) -> Vec<CodeSlice> {
    merge_lines(slices, &split_lines(content))
}

fn merge_lines(mut slices: Vec<CodeSlice>, lines: &[&str]) -> Vec<CodeSlice> {
    slices.sort_by_key(|s| (s.start_line, s.end_line));

    let mut groups: Vec<(usize, usize, Vec<String>)> = Vec::new();
    for slice in slices {
        let reasons = slice.reason.split("; ").map(str::to_string);
        match groups.last_mut() {
            Some(last) if slice.start_line <= last.1 + 1 => {
                last.1 = last.1.max(slice.end_line);
                for reason in reasons {
                    if !last.2.contains(&reason) {
                        last.2.push(reason);
                    }
                }
            }
            _ => groups.push((slice.start_line, slice.end_line, reasons.collect())),
        }
    }

    groups
        .into_iter()
        .filter_map(|(start, end, reasons)| {
            let start = start.max(1);
            let end = end.min(lines.len());
            (start <= end).then(|| CodeSlice {
                start_line: start,
                end_line: end,
                content: cap_single_line(render(lines, start, end), start == end),
                reason: reasons.join("; "),
            })
        })
        .collect()
}

struct Collector<'a> {
    lines: &'a [&'a str],
    budget: usize,
    used: usize,
    accepted: Vec<CodeSlice>,
    truncated: Vec<bool>,
}

impl<'a> Collector<'a> {
    fn new(lines: &'a [&'a str], budget: usize) -> Self {
        Self {
            lines,
            budget,
            used: 0,
            accepted: Vec::new(),
            truncated: Vec::new(),
        }
    }

    fn overlaps(&self, start: usize, end: usize) -> bool {
        self.accepted
            .iter()
            .any(|s| start <= s.end_line && s.start_line <= end)
    }

    /// Merging two touching slices adds one newline, so each neighbour a
    /// mergeable slice will join is charged one extra character.
    fn accept(&mut self, slice: CodeSlice, truncated: bool) {
        if self.overlaps(slice.start_line, slice.end_line) {
            return;
        }
        let joins = if truncated {
            0
        } else {
            self.accepted
                .iter()
                .zip(&self.truncated)
                .filter(|(s, cut)| {
                    !**cut
                        && (s.end_line + 1 == slice.start_line || slice.end_line + 1 == s.start_line)
                })
                .count()
        };
        let cost = slice.content.chars().count() + joins;
        if self.used + cost > self.budget {
            return;
        }
        self.used += cost;
        self.accepted.push(slice);
        self.truncated.push(truncated);
    }

    /// Merge touching slices. Truncated windows keep their capped text and
    /// are never merged.
    fn finish(self) -> Vec<CodeSlice> {
        let (kept, mergeable): (Vec<_>, Vec<_>) = self
            .accepted
            .into_iter()
            .zip(self.truncated)
            .partition(|(_, cut)| *cut);
        let mut slices = merge_lines(mergeable.into_iter().map(|(s, _)| s).collect(), self.lines);
        slices.extend(kept.into_iter().map(|(s, _)| s));
        slices.sort_by_key(|s| s.start_line);
        slices
    }

    /// A window of context lines around `center`, shrunk toward the
    /// center line when its text is oversized.
    fn offer_window(&mut self, center: usize, mut reason: String) {
        let mut start = center.saturating_sub(CONTEXT_LINES).max(1);
        let mut end = (center + CONTEXT_LINES).min(self.lines.len());
        if self.overlaps(start, end) {
            return;
        }

        let mut content = render(self.lines, start, end);
        let truncated = content.chars().count() > MAX_SLICE_CHARS;
        if truncated {
            while content.chars().count() > MAX_SLICE_CHARS && end > center {
                end -= 1;
                content = render(self.lines, start, end);
            }
            while content.chars().count() > MAX_SLICE_CHARS && start < center {
                start += 1;
                content = render(self.lines, start, end);
            }
            content = cap_single_line(content, start == end);
            reason.push_str(" (truncated)");
        }

        self.accept(
            CodeSlice {
                start_line: start,
                end_line: end,
                content,
                reason,
            },
            truncated,
        );
    }

    /// A whole declaration block; oversized blocks are dropped.
    fn offer_block(&mut self, start: usize, end: usize, reason: &str) {
        if self.overlaps(start, end) {
            return;
        }
        let content = render(self.lines, start, end);
        if content.chars().count() > MAX_SLICE_CHARS {
            return;
        }
        self.accept(
            CodeSlice {
                start_line: start,
                end_line: end,
                content,
                reason: reason.to_string(),
            },
            false,
        );
    }
}

/// Index of the last line of the block opened at `start`.
///
/// Brace-delimited blocks end when braces (and, if `count_parens`,
/// parentheses) balance. A Python-style header ending in `:` ends at the
/// last line indented deeper than it. `None` if the block does not close
/// within [`MAX_BLOCK_LINES`].
fn block_end(lines: &[&str], start: usize, count_parens: bool) -> Option<usize> {
    let header = lines[start].trim_end();
    if header.ends_with(':') && !header.contains('{') {
        return indented_block_end(lines, start);
    }

    let limit = (start + MAX_BLOCK_LINES).min(lines.len());
    let mut braces: i64 = 0;
    let mut parens: i64 = 0;
    let mut seen_brace = false;

    for (idx, line) in lines.iter().enumerate().take(limit).skip(start) {
        for ch in line.chars() {
            match ch {
                '{' => {
                    braces += 1;
                    seen_brace = true;
                }
                '}' => braces -= 1,
                '(' if count_parens => parens += 1,
                ')' if count_parens => parens -= 1,
                _ => {}
            }
        }
        if braces <= 0 && parens <= 0 && (seen_brace || !continues(line)) {
            return Some(idx);
        }
    }
    None
}

fn indented_block_end(lines: &[&str], start: usize) -> Option<usize> {
    let base = indent_of(lines[start]);
    let mut last = start;
    for (idx, line) in lines.iter().enumerate().skip(start + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if indent_of(line) <= base {
            break;
        }
        last = idx;
        if last - start + 1 > MAX_BLOCK_LINES {
            return None;
        }
    }
    Some(last)
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// True if a brace-less line clearly continues onto the next one.
fn continues(line: &str) -> bool {
    let trimmed = line.trim_end();
    trimmed.ends_with(['=', ',', '(', '|', '&', '>', '+'])
}

fn split_lines(content: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = content.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    lines
}

/// Text of 1-based inclusive lines `start..=end`.
fn render(lines: &[&str], start: usize, end: usize) -> String {
    lines[start - 1..end].join("\n")
}

fn cap_single_line(content: String, single_line: bool) -> String {
    if !single_line || content.chars().count() <= MAX_SLICE_CHARS {
        return content;
    }
    let mut capped: String = content.chars().take(MAX_SLICE_CHARS).collect();
    capped.push_str(TRUNCATION_MARKER);
    capped
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::Severity;

    fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("let v{i} = {i};\n")).collect()
    }

    #[test]
    fn zero_cap_returns_nothing() {
        let opts = SliceOptions {
            max_total_chars: 0,
            ..SliceOptions::default()
        };
        assert!(extract_slices("const password = 'x';", "a.ts", &opts).is_empty());
    }

    #[test]
    fn empty_content_returns_nothing() {
        assert!(extract_slices("", "a.ts", &SliceOptions::default()).is_empty());
    }

    #[test]
    fn finding_window_is_clamped_to_file() {
        let content = numbered(15);
        let findings = [Finding::new("lint/x", Severity::Warning, "a.ts", "m").at_line(3)];
        let opts = SliceOptions {
            findings: &findings,
            ..SliceOptions::default()
        };
        let slices = extract_slices(&content, "a.ts", &opts);
        assert_eq!(slices.len(), 1);
        assert_eq!((slices[0].start_line, slices[0].end_line), (1, 13));
        assert_eq!(slices[0].reason, "static finding at line 3");
    }

    #[test]
    fn findings_for_other_files_or_bad_lines_are_ignored() {
        let content = numbered(30);
        let findings = [
            Finding::new("lint/x", Severity::Warning, "b.ts", "m").at_line(3),
            Finding::new("lint/x", Severity::Warning, "a.ts", "m").at_line(99),
            Finding::new("lint/x", Severity::Warning, "a.ts", "m").at_line(0),
            Finding::new("lint/x", Severity::Warning, "a.ts", "m"),
        ];
        let opts = SliceOptions {
            findings: &findings,
            ..SliceOptions::default()
        };
        assert!(extract_slices(&content, "a.ts", &opts).is_empty());
    }

    #[test]
    fn overlapping_windows_are_skipped_not_merged() {
        let mut content = numbered(60);
        content.push_str("const token = jwt.sign(payload);\n");
        let findings = [
            Finding::new("lint/a", Severity::Warning, "a.ts", "m").at_line(20),
            Finding::new("lint/b", Severity::Warning, "a.ts", "m").at_line(25),
        ];
        let opts = SliceOptions {
            findings: &findings,
            ..SliceOptions::default()
        };
        let slices = extract_slices(&content, "a.ts", &opts);
        assert_eq!((slices[0].start_line, slices[0].end_line), (10, 30));
        assert_eq!(slices[0].reason, "static finding at line 20");
        assert_eq!((slices[1].start_line, slices[1].end_line), (51, 61));
        assert_eq!(slices[1].reason, "security: auth token");
    }

    #[test]
    fn first_security_category_wins() {
        assert_eq!(security_category("const hash = bcrypt.hash(password)"), Some("credentials"));
        assert_eq!(security_category("bcrypt.hash(pw, 10)"), Some("password hashing"));
        assert_eq!(security_category("el.innerHTML = html"), Some("unsafe HTML"));
        assert_eq!(security_category("db.query(`SELECT * FROM t`)"), Some("SQL query"));
        assert_eq!(security_category("const port = 3000;"), None);
    }

    #[test]
    fn security_can_be_disabled() {
        let opts = SliceOptions {
            include_security: false,
            ..SliceOptions::default()
        };
        assert!(extract_slices("const k = process.env.KEY;\n", "a.ts", &opts).is_empty());
    }

    #[test]
    fn function_block_is_balanced() {
        let content = "let a = 1;\nfunction add(\n  x,\n  y\n) {\n  if (x) {\n    return x + y;\n  }\n  return y;\n}\nlet b = 2;\n";
        let opts = SliceOptions {
            include_security: false,
            include_exports: false,
            ..SliceOptions::default()
        };
        let slices = extract_slices(content, "a.js", &opts);
        assert_eq!(slices.len(), 1);
        assert_eq!((slices[0].start_line, slices[0].end_line), (2, 10));
        assert!(slices[0].content.ends_with('}'));
        assert_eq!(slices[0].reason, "declaration");
    }

    #[test]
    fn python_def_uses_indentation() {
        let content = "import os\n\ndef handler(event):\n    x = 1\n\n    return x\n\nprint('done')\n";
        let opts = SliceOptions {
            include_security: false,
            ..SliceOptions::default()
        };
        let slices = extract_slices(content, "h.py", &opts);
        assert_eq!(slices.len(), 1);
        assert_eq!((slices[0].start_line, slices[0].end_line), (3, 6));
    }

    #[test]
    fn oversized_blocks_are_dropped() {
        let mut content = String::from("export function big() {\n");
        for i in 0..60 {
            content.push_str(&format!("  step{i}();\n"));
        }
        content.push_str("}\n");
        let opts = SliceOptions {
            include_security: false,
            ..SliceOptions::default()
        };
        assert!(extract_slices(&content, "a.ts", &opts).is_empty());
    }

    #[test]
    fn export_lines_make_blocks() {
        let content = "export {\n  a,\n  b,\n};\nlet x = 1;\n";
        let opts = SliceOptions {
            include_security: false,
            include_functions: false,
            ..SliceOptions::default()
        };
        let slices = extract_slices(content, "a.ts", &opts);
        assert_eq!(slices.len(), 1);
        assert_eq!((slices[0].start_line, slices[0].end_line), (1, 4));
        assert_eq!(slices[0].reason, "export");
    }

    #[test]
    fn budget_skips_but_keeps_scanning() {
        let mut content = String::new();
        content.push_str(&format!("const password = '{}';\n", "p".repeat(400)));
        content.push_str(&numbered(30));
        content.push_str("const k = process.env.KEY;\n");
        let opts = SliceOptions {
            include_functions: false,
            include_exports: false,
            max_total_chars: 300,
            ..SliceOptions::default()
        };
        let slices = extract_slices(&content, "a.ts", &opts);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].reason, "security: environment access");
    }

    #[test]
    fn oversized_window_is_truncated() {
        let long = format!("let filler = '{}';\n", "y".repeat(600));
        let mut content = long.repeat(10);
        content.push_str("const secret = 1;\n");
        content.push_str(&long.repeat(10));
        let opts = SliceOptions {
            include_functions: false,
            include_exports: false,
            ..SliceOptions::default()
        };
        let slices = extract_slices(&content, "a.ts", &opts);
        assert_eq!(slices.len(), 1);
        let s = &slices[0];
        assert!(s.start_line <= 11 && 11 <= s.end_line);
        assert!(s.content.chars().count() <= MAX_SLICE_CHARS);
        assert!(s.reason.ends_with("(truncated)"));
    }

    #[test]
    fn single_huge_line_is_cut_with_marker() {
        let content = format!("const secret = '{}';\n", "z".repeat(9_000));
        let slices = extract_slices(&content, "a.ts", &SliceOptions::default());
        assert_eq!(slices.len(), 1);
        assert!(slices[0].content.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn truncated_window_keeps_cap_next_to_declaration() {
        let content = format!("const secret = '{}';\nfunction f() {{\n}}\n", "z".repeat(9_000));
        let opts = SliceOptions {
            include_exports: false,
            max_total_chars: 6_000,
            ..SliceOptions::default()
        };
        let slices = extract_slices(&content, "a.ts", &opts);
        assert_eq!(slices.len(), 2);

        let total: usize = slices.iter().map(|s| s.content.chars().count()).sum();
        assert!(total <= 6_000, "{total} chars over budget");
        for s in &slices {
            assert!(s.content.chars().count() <= MAX_SLICE_CHARS + TRUNCATION_MARKER.len());
        }

        assert_eq!((slices[0].start_line, slices[0].end_line), (1, 1));
        assert!(slices[0].content.ends_with(TRUNCATION_MARKER));
        assert!(slices[0].reason.contains("(truncated)"));
        assert_eq!((slices[1].start_line, slices[1].end_line), (2, 3));
        assert_eq!(slices[1].reason, "declaration");
    }

    #[test]
    fn adjacent_slices_merge_and_union_reasons() {
        let content = numbered(10);
        let s = |a, b, r: &str| CodeSlice {
            start_line: a,
            end_line: b,
            content: String::new(),
            reason: r.into(),
        };
        let merged = merge_slices(vec![s(4, 6, "x; y"), s(1, 3, "x"), s(9, 10, "z")], &content);
        assert_eq!(merged.len(), 2);
        assert_eq!((merged[0].start_line, merged[0].end_line), (1, 6));
        assert_eq!(merged[0].reason, "x; y");
        assert_eq!(merged[0].content, "let v1 = 1;\nlet v2 = 2;\nlet v3 = 3;\nlet v4 = 4;\nlet v5 = 5;\nlet v6 = 6;");
        assert_eq!((merged[1].start_line, merged[1].end_line), (9, 10));
    }
}

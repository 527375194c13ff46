use std::collections::HashMap;

use prism_core::Finding;

/// Characters of normalized message kept in the dedup key.
const MESSAGE_KEY_CHARS: usize = 50;

/// Normalize a finding message for comparison.
///
/// Lowercases, collapses whitespace, drops everything except letters,
/// digits and spaces, and keeps the first 50 characters.
///
/// # Examples
///
/// ```
/// use prism_review::dedup::normalize_message;
///
/// assert_eq!(normalize_message("  SQL   injection!! "), "sql injection");
/// ```
pub fn normalize_message(message: &str) -> String {
    let collapsed = message
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let cleaned: String = collapsed
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .collect();
    cleaned.trim().chars().take(MESSAGE_KEY_CHARS).collect()
}

/// Identity of a finding for deduplication: `file:line:message`.
pub fn dedup_key(finding: &Finding) -> String {
    format!(
        "{}:{}:{}",
        finding.file,
        finding.line.unwrap_or(0),
        normalize_message(&finding.message)
    )
}

/// Merge findings that share a [`dedup_key`].
///
/// The first occurrence fixes the position in the output. A later duplicate
/// with strictly higher severity replaces it; equal or lower severity is
/// dropped.
///
/// # Examples
///
/// ```
/// use prism_core::{Finding, Severity};
/// use prism_review::dedup::deduplicate;
///
/// let findings = vec![
///     Finding::new("ai/deep/sql", Severity::Warning, "f.ts", "SQL injection").at_line(5),
///     Finding::new("ai/security/sql", Severity::Error, "f.ts", "sql injection!!").at_line(5),
/// ];
/// let merged = deduplicate(findings);
/// assert_eq!(merged.len(), 1);
/// assert_eq!(merged[0].severity, Severity::Error);
/// ```
pub fn deduplicate(findings: Vec<Finding>) -> Vec<Finding> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<Finding> = Vec::with_capacity(findings.len());

    for finding in findings {
        let key = dedup_key(&finding);
        match positions.get(&key) {
            Some(&idx) => {
                if finding.severity.rank() > kept[idx].severity.rank() {
                    kept[idx] = finding;
                }
            }
            None => {
                positions.insert(key, kept.len());
                kept.push(finding);
            }
        }
    }

    kept
}

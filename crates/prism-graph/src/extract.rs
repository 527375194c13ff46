//! Regex-based import and export extraction.
//!
//! This is an approximation, not a parser: matches inside comments and
//! strings are not filtered out. The contract other modules rely on is only
//! the output shape, a list of raw specifiers and a list of exported names.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Source language family, keyed by file extension.
///
/// # Examples
///
/// ```
/// use prism_graph::extract::SourceLanguage;
///
/// assert_eq!(SourceLanguage::from_extension("tsx"), SourceLanguage::JavaScript);
/// assert_eq!(SourceLanguage::from_extension("py"), SourceLanguage::Python);
/// assert_eq!(SourceLanguage::from_extension("md"), SourceLanguage::Other);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLanguage {
    /// JavaScript and TypeScript, including JSX and module variants.
    JavaScript,
    Python,
    Other,
}

impl SourceLanguage {
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" | "mts" | "cts" => {
                SourceLanguage::JavaScript
            }
            "py" => SourceLanguage::Python,
            _ => SourceLanguage::Other,
        }
    }
}

fn js_static_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\bimport\s+(?:type\s+)?(?:[\w*{}\s,$]+?\s+from\s+)?["']([^"'\n]+)["']"#)
            .expect("static import regex compiles")
    })
}

fn js_reexport_from() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\bexport\s+(?:type\s+)?(?:\*(?:\s+as\s+\w+)?|\{[^}]*\})\s*from\s+["']([^"'\n]+)["']"#)
            .expect("re-export regex compiles")
    })
}

fn js_dynamic_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\bimport\s*\(\s*["']([^"'\n]+)["']\s*\)"#).expect("dynamic import regex compiles")
    })
}

fn js_require() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\brequire\s*\(\s*["']([^"'\n]+)["']\s*\)"#).expect("require regex compiles")
    })
}

fn py_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*import[ \t]+([^\n#;]+)").expect("python import regex compiles"))
}

fn py_from_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*from[ \t]+([\w.]+)[ \t]+import\b").expect("python from regex compiles")
    })
}

fn js_named_export() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\bexport\s+(?:declare\s+)?(?:async\s+)?(?:abstract\s+)?(?:const|let|var|function\s*\*?|class|interface|type|enum)\s+([A-Za-z_$][\w$]*)",
        )
        .expect("named export regex compiles")
    })
}

fn js_default_export() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bexport\s+default\b").expect("default export regex compiles"))
}

fn js_export_list() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bexport\s+(?:type\s+)?\{([^}]*)\}").expect("export list regex compiles")
    })
}

fn py_top_level_def() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^(?:async[ \t]+)?(?:def|class)[ \t]+([A-Za-z_]\w*)")
            .expect("python def regex compiles")
    })
}

/// Extract raw import specifiers, as written, in first-seen order.
///
/// # Examples
///
/// ```
/// use prism_graph::extract::{extract_imports, SourceLanguage};
///
/// let src = r#"
/// import React from "react";
/// import { a } from './a';
/// const b = require("../b");
/// const c = await import("./c");
/// "#;
/// let imports = extract_imports(src, SourceLanguage::JavaScript);
/// assert_eq!(imports, vec!["react", "./a", "../b", "./c"]);
/// ```
pub fn extract_imports(content: &str, language: SourceLanguage) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();
    match language {
        SourceLanguage::JavaScript => {
            for re in [
                js_static_import(),
                js_reexport_from(),
                js_dynamic_import(),
                js_require(),
            ] {
                collect_first_group(re, content, &mut found);
            }
        }
        SourceLanguage::Python => {
            for caps in py_import().captures_iter(content) {
                let (Some(whole), Some(list)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                for part in list.as_str().split(',') {
                    if let Some(module) = part.split_whitespace().next() {
                        found.push((whole.start(), module.to_string()));
                    }
                }
            }
            collect_first_group(py_from_import(), content, &mut found);
        }
        SourceLanguage::Other => {}
    }

    found.sort_by_key(|(pos, _)| *pos);
    dedup_preserving_order(found.into_iter().map(|(_, s)| s))
}

/// Extract exported names.
///
/// For JavaScript/TypeScript this is every named declaration export, the
/// literal `default` when `export default` appears, and local names listed
/// in `export { … }` clauses. For Python it is every top-level `def` or
/// `class` whose name does not start with `_`.
///
/// # Examples
///
/// ```
/// use prism_graph::extract::{extract_exports, SourceLanguage};
///
/// let src = "export function run() {}\nexport { a, b as c };\nexport default run;";
/// let exports = extract_exports(src, SourceLanguage::JavaScript);
/// assert_eq!(exports, vec!["run", "a", "b", "default"]);
/// ```
pub fn extract_exports(content: &str, language: SourceLanguage) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();
    match language {
        SourceLanguage::JavaScript => {
            collect_first_group(js_named_export(), content, &mut found);
            for caps in js_export_list().captures_iter(content) {
                let (Some(whole), Some(list)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                for item in list.as_str().split(',') {
                    let item = item.trim();
                    let item = item.strip_prefix("type ").unwrap_or(item).trim();
                    if let Some(name) = item.split_whitespace().next() {
                        found.push((whole.start(), name.to_string()));
                    }
                }
            }
            if let Some(m) = js_default_export().find(content) {
                found.push((m.start(), "default".to_string()));
            }
        }
        SourceLanguage::Python => {
            for caps in py_top_level_def().captures_iter(content) {
                let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                if !name.as_str().starts_with('_') {
                    found.push((whole.start(), name.as_str().to_string()));
                }
            }
        }
        SourceLanguage::Other => {}
    }

    found.sort_by_key(|(pos, _)| *pos);
    dedup_preserving_order(found.into_iter().map(|(_, s)| s))
}

fn collect_first_group(re: &Regex, content: &str, out: &mut Vec<(usize, String)>) {
    for caps in re.captures_iter(content) {
        if let (Some(whole), Some(group)) = (caps.get(0), caps.get(1)) {
            out.push((whole.start(), group.as_str().trim().to_string()));
        }
    }
}

fn dedup_preserving_order(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

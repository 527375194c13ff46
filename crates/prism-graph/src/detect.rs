use std::collections::HashMap;

use prism_core::{DetectedFramework, FrameworkInfo};

use crate::source::FileSet;

/// `package.json` dependency names mapped to (framework, confidence).
const JS_FRAMEWORKS: [(&str, &str, f64); 7] = [
    ("next", "next", 0.95),
    ("@nestjs/core", "nestjs", 0.9),
    ("express", "express", 0.85),
    ("fastify", "fastify", 0.85),
    ("react", "react", 0.8),
    ("vue", "vue", 0.8),
    ("svelte", "svelte", 0.8),
];

const PY_FRAMEWORKS: [&str; 3] = ["django", "flask", "fastapi"];
const PY_CONFIDENCE: f64 = 0.85;
const PY_MANIFESTS: [&str; 2] = ["requirements.txt", "pyproject.toml"];

/// Detect languages and frameworks from file extensions and root manifests.
///
/// Languages are ordered by file count, most common first. The primary
/// framework is the one with the highest confidence.
///
/// # Examples
///
/// ```
/// use prism_core::FileRecord;
/// use prism_graph::detect::detect_frameworks;
/// use prism_graph::source::FileSet;
///
/// let files = FileSet::new(vec![
///     FileRecord::inline("package.json", r#"{"dependencies":{"next":"14.0.0","react":"18.2.0"}}"#),
///     FileRecord::inline("app/page.tsx", ""),
/// ]);
/// let info = detect_frameworks(&files);
/// assert_eq!(info.primary.as_deref(), Some("next"));
/// assert_eq!(info.languages, vec!["typescript"]);
/// ```
pub fn detect_frameworks(files: &FileSet) -> FrameworkInfo {
    let mut frameworks = Vec::new();

    if let Some(text) = files.content("package.json") {
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(manifest) => frameworks.extend(js_frameworks(&manifest)),
            Err(e) => tracing::debug!(error = %e, "package.json is not valid JSON"),
        }
    }

    for manifest in PY_MANIFESTS {
        let Some(text) = files.content(manifest) else {
            continue;
        };
        let lower = text.to_lowercase();
        for name in PY_FRAMEWORKS {
            let already = frameworks.iter().any(|f: &DetectedFramework| f.name == name);
            if !already && lower.contains(name) {
                frameworks.push(DetectedFramework {
                    name: name.to_string(),
                    confidence: PY_CONFIDENCE,
                });
            }
        }
    }

    let primary = frameworks
        .iter()
        .fold(None::<&DetectedFramework>, |best, f| match best {
            Some(b) if b.confidence >= f.confidence => Some(b),
            _ => Some(f),
        })
        .map(|f| f.name.clone());

    FrameworkInfo {
        frameworks,
        primary,
        languages: languages(files),
    }
}

fn js_frameworks(manifest: &serde_json::Value) -> Vec<DetectedFramework> {
    let has_dep = |name: &str| {
        ["dependencies", "devDependencies"]
            .iter()
            .any(|section| manifest.get(section).and_then(|deps| deps.get(name)).is_some())
    };
    JS_FRAMEWORKS
        .iter()
        .filter(|(dep, _, _)| has_dep(*dep))
        .map(|&(_, name, confidence)| DetectedFramework {
            name: name.to_string(),
            confidence,
        })
        .collect()
}

fn languages(files: &FileSet) -> Vec<String> {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for record in files.records() {
        if let Some(lang) = language_for(&record.extension) {
            *counts.entry(lang).or_default() += 1;
        }
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    ranked.into_iter().map(|(lang, _)| lang.to_string()).collect()
}

fn language_for(extension: &str) -> Option<&'static str> {
    let lang = match extension {
        "ts" | "tsx" | "mts" | "cts" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "py" => "python",
        "rs" => "rust",
        "go" => "go",
        "java" => "java",
        "kt" => "kotlin",
        "rb" => "ruby",
        "php" => "php",
        "cs" => "csharp",
        "vue" => "vue",
        "svelte" => "svelte",
        _ => return None,
    };
    Some(lang)
}

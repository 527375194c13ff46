//! Path-based file categorization.

use prism_core::FileCategory;

/// Assign a category to `relative_path` by trying each category in
/// `precedence` order. The first one whose patterns match wins; anything
/// unmatched is [`FileCategory::Other`].
///
/// # Examples
///
/// ```
/// use prism_core::{FileCategory, ScoringConfig};
/// use prism_graph::category::categorize;
///
/// let order = ScoringConfig::default().category_precedence;
/// assert_eq!(categorize("src/__tests__/auth.test.ts", &order), FileCategory::Test);
/// assert_eq!(categorize("pages/api/login.ts", &order), FileCategory::Api);
/// assert_eq!(categorize("src/index.ts", &order), FileCategory::Entry);
/// assert_eq!(categorize("docs/notes.md", &order), FileCategory::Other);
/// ```
pub fn categorize(relative_path: &str, precedence: &[FileCategory]) -> FileCategory {
    let path = relative_path.to_lowercase();
    let parts = PathParts::new(&path);
    precedence
        .iter()
        .copied()
        .find(|&category| matches_category(category, &parts))
        .unwrap_or(FileCategory::Other)
}

struct PathParts<'a> {
    /// Directory segments, excluding the file name.
    dirs: Vec<&'a str>,
    name: &'a str,
    /// File name up to its first dot.
    stem: &'a str,
}

impl<'a> PathParts<'a> {
    fn new(path: &'a str) -> Self {
        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let name = segments.pop().unwrap_or("");
        let stem = match name.find('.') {
            Some(0) | None => name,
            Some(idx) => &name[..idx],
        };
        Self {
            dirs: segments,
            name,
            stem,
        }
    }

    fn has_dir(&self, dir: &str) -> bool {
        self.dirs.iter().any(|d| *d == dir)
    }

    fn is_under(&self, prefix: &[&str]) -> bool {
        self.dirs.starts_with(prefix)
    }

    /// True if `seq` appears as consecutive directory segments.
    fn has_dir_sequence(&self, seq: &[&str]) -> bool {
        self.dirs.windows(seq.len()).any(|w| w == seq)
    }
}

fn matches_category(category: FileCategory, parts: &PathParts<'_>) -> bool {
    match category {
        FileCategory::Test => is_test(parts),
        FileCategory::Config => is_config(parts),
        FileCategory::Api => is_api(parts),
        FileCategory::Entry => is_entry(parts),
        FileCategory::Component => parts.has_dir("components"),
        FileCategory::Util => ["utils", "helpers", "lib", "services"]
            .iter()
            .any(|d| parts.has_dir(d)),
        FileCategory::Other => true,
    }
}

fn is_test(parts: &PathParts<'_>) -> bool {
    let name = parts.name;
    name.contains(".test.")
        || name.contains(".spec.")
        || parts.has_dir("__tests__")
        || (name.ends_with(".py") && (name.starts_with("test_") || name.ends_with("_test.py")))
}

fn is_config(parts: &PathParts<'_>) -> bool {
    let name = parts.name;
    name.starts_with('.')
        || name.contains(".config.")
        || name.starts_with("tsconfig")
        || name == "package.json"
}

fn is_api(parts: &PathParts<'_>) -> bool {
    parts.has_dir_sequence(&["pages", "api"])
        || parts.has_dir_sequence(&["app", "api"])
        || parts.has_dir("routes")
        || parts.has_dir("controllers")
        || parts.has_dir("api")
}

fn is_entry(parts: &PathParts<'_>) -> bool {
    let at_root_or_src = parts.dirs.is_empty() || parts.dirs == ["src"];
    if at_root_or_src && matches!(parts.stem, "index" | "main" | "app" | "server") {
        return true;
    }

    if parts.is_under(&["pages"]) || parts.is_under(&["src", "pages"]) {
        return true;
    }
    (parts.is_under(&["app"]) || parts.is_under(&["src", "app"]))
        && matches!(parts.stem, "page" | "route" | "layout")
}

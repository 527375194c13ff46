use prism_core::{FileCategory, ScoringConfig};

use crate::graph::{DependencyGraph, GraphNode};

/// Path substrings that mark a file as security-sensitive.
const SECURITY_KEYWORDS: [&str; 10] = [
    "auth",
    "login",
    "password",
    "token",
    "secret",
    "crypto",
    "session",
    "permission",
    "admin",
    "security",
];

/// Heuristic relevance score for one node. Never negative.
///
/// # Examples
///
/// ```
/// use prism_core::{FileCategory, ScoringConfig};
/// use prism_graph::graph::GraphNode;
/// use prism_graph::priority::score_node;
///
/// let node = GraphNode {
///     path: "src/auth/login.ts".into(),
///     imports: vec!["./db".into()],
///     imported_by: vec!["src/index.ts".into(), "src/api.ts".into()],
///     exports: vec!["login".into()],
///     category: FileCategory::Other,
///     size: 2_000,
///     priority: None,
/// };
/// // 2 importers * 10 + 1 import * 2 + 1 export * 3 + security 50
/// assert_eq!(score_node(&node, &ScoringConfig::default()), 75);
/// ```
pub fn score_node(node: &GraphNode, scoring: &ScoringConfig) -> i64 {
    let mut score = match node.category {
        FileCategory::Entry => scoring.entry_base,
        FileCategory::Config => scoring.config_base,
        FileCategory::Api => scoring.api_base,
        _ => 0,
    };

    score += count(node.imported_by.len()) * scoring.importer_weight;
    score += (count(node.imports.len()) * scoring.import_weight).min(scoring.import_cap);
    score += (count(node.exports.len()) * scoring.export_weight).min(scoring.export_cap);

    if is_security_sensitive(&node.path) {
        score += scoring.security_bonus;
    }
    if node.size > scoring.large_file_bytes {
        score -= scoring.large_penalty;
    }
    if node.size > scoring.huge_file_bytes {
        score -= scoring.huge_penalty;
    }
    if node.category == FileCategory::Test {
        score -= scoring.test_penalty;
    }

    score.max(0)
}

/// Score every node in place.
pub fn assign_priorities(graph: &mut DependencyGraph, scoring: &ScoringConfig) {
    for node in graph.nodes_mut() {
        let score = score_node(node, scoring);
        node.priority = Some(score);
    }
}

/// True if the path contains any of the security keywords.
pub fn is_security_sensitive(path: &str) -> bool {
    let lower = path.to_lowercase();
    SECURITY_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FileSet;
    use prism_core::FileRecord;

    fn node(path: &str, category: FileCategory) -> GraphNode {
        GraphNode {
            path: path.into(),
            imports: Vec::new(),
            imported_by: Vec::new(),
            exports: Vec::new(),
            category,
            size: 100,
            priority: None,
        }
    }

    #[test]
    fn category_base_scores() {
        let scoring = ScoringConfig::default();
        assert_eq!(score_node(&node("index.ts", FileCategory::Entry), &scoring), 100);
        assert_eq!(score_node(&node("package.json", FileCategory::Config), &scoring), 80);
        assert_eq!(score_node(&node("routes/x.ts", FileCategory::Api), &scoring), 70);
        assert_eq!(score_node(&node("lib/x.ts", FileCategory::Util), &scoring), 0);
    }

    #[test]
    fn import_and_export_contributions_are_capped() {
        let scoring = ScoringConfig::default();
        let mut n = node("x.ts", FileCategory::Other);
        n.imports = (0..50).map(|i| format!("./m{i}")).collect();
        n.exports = (0..50).map(|i| format!("e{i}")).collect();
        assert_eq!(score_node(&n, &scoring), 20 + 30);
    }

    #[test]
    fn size_penalties_stack() {
        let scoring = ScoringConfig::default();
        let mut n = node("index.ts", FileCategory::Entry);
        n.size = 60 * 1024;
        assert_eq!(score_node(&n, &scoring), 80);
        n.size = 200 * 1024;
        assert_eq!(score_node(&n, &scoring), 50);
    }

    #[test]
    fn score_is_clamped_at_zero() {
        let scoring = ScoringConfig::default();
        let mut n = node("big.test.ts", FileCategory::Test);
        n.size = 500 * 1024;
        assert_eq!(score_node(&n, &scoring), 0);
    }

    #[test]
    fn security_keyword_matches_case_insensitively() {
        assert!(is_security_sensitive("src/Auth/Provider.tsx"));
        assert!(is_security_sensitive("lib/session-store.ts"));
        assert!(!is_security_sensitive("src/components/Button.tsx"));
    }

    #[test]
    fn custom_constants_are_honored() {
        let scoring = ScoringConfig {
            entry_base: 5,
            security_bonus: 1,
            ..ScoringConfig::default()
        };
        assert_eq!(score_node(&node("src/main.ts", FileCategory::Entry), &scoring), 5);
        assert_eq!(score_node(&node("admin.ts", FileCategory::Other), &scoring), 1);
    }

    #[test]
    fn assign_priorities_scores_every_node() {
        let files = FileSet::new(vec![
            FileRecord::inline("index.ts", "import './lib';"),
            FileRecord::inline("lib.ts", "export const a = 1;"),
        ]);
        let scoring = ScoringConfig::default();
        let mut graph = DependencyGraph::build(&files, &scoring.category_precedence);
        assign_priorities(&mut graph, &scoring);

        // entry 100 + one import 2
        assert_eq!(graph.get("index.ts").unwrap().priority, Some(102));
        // one importer 10 + one export 3
        assert_eq!(graph.get("lib.ts").unwrap().priority, Some(13));
        let order: Vec<&str> = graph.sorted_by_priority().iter().map(|n| n.path.as_str()).collect();
        assert_eq!(order, vec!["index.ts", "lib.ts"]);
    }
}

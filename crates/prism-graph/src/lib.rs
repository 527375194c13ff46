//! File-level dependency graph, prioritization and code slicing.
//!
//! Builds a directed import graph from source text with regex extraction,
//! categorizes every file, scores it for review relevance, and extracts
//! line ranges from files too large to send whole. The `ignore` crate
//! drives repository walking.

pub mod category;
pub mod detect;
pub mod extract;
pub mod graph;
pub mod priority;
pub mod slice;
pub mod source;
pub mod tokens;
pub mod walker;

use prism_core::ScoringConfig;

use crate::graph::DependencyGraph;
use crate::source::FileSet;

/// Build the dependency graph for `files` and score every node.
///
/// # Examples
///
/// ```
/// use prism_core::{FileRecord, ScoringConfig};
/// use prism_graph::build_graph;
/// use prism_graph::source::FileSet;
///
/// let files = FileSet::new(vec![
///     FileRecord::inline("src/index.ts", "import { db } from './db';"),
///     FileRecord::inline("src/db.ts", "export const db = {};"),
/// ]);
/// let graph = build_graph(&files, &ScoringConfig::default());
/// let top = graph.sorted_by_priority()[0];
/// assert_eq!(top.path, "src/index.ts");
/// assert!(graph.nodes().all(|n| n.priority.is_some()));
/// ```
pub fn build_graph(files: &FileSet, scoring: &ScoringConfig) -> DependencyGraph {
    let mut graph = DependencyGraph::build(files, &scoring.category_precedence);
    priority::assign_priorities(&mut graph, scoring);
    graph
}

use std::collections::HashMap;
use std::fmt;

use prism_core::FileCategory;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::category::categorize;
use crate::extract::{extract_exports, extract_imports, SourceLanguage};
use crate::source::FileSet;

/// Suffixes tried, in order, when a relative specifier has no exact match.
const RESOLVE_SUFFIXES: [&str; 8] = [
    ".ts",
    ".tsx",
    ".js",
    ".jsx",
    ".mjs",
    "/index.ts",
    "/index.tsx",
    "/index.js",
];

/// One file in the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// Relative path of the file.
    pub path: String,
    /// Import specifiers as written in the source, unresolved.
    pub imports: Vec<String>,
    /// Relative paths of files whose imports resolve to this one.
    pub imported_by: Vec<String>,
    /// Exported names.
    pub exports: Vec<String>,
    pub category: FileCategory,
    /// File size in bytes.
    pub size: u64,
    /// Relevance score, set by [`assign_priorities`](crate::priority::assign_priorities).
    #[serde(default)]
    pub priority: Option<i64>,
}

impl GraphNode {
    /// Priority, treating an unscored node as 0.
    pub fn score(&self) -> i64 {
        self.priority.unwrap_or(0)
    }
}

/// File-level dependency graph keyed by relative path.
///
/// Nodes keep the order of the file set they were built from, and that
/// order is preserved through JSON serialization.
///
/// # Examples
///
/// ```
/// use prism_core::{FileCategory, FileRecord, ScoringConfig};
/// use prism_graph::graph::DependencyGraph;
/// use prism_graph::source::FileSet;
///
/// let files = FileSet::new(vec![
///     FileRecord::inline("index.ts", "import { helper } from './lib';"),
///     FileRecord::inline("lib.ts", "export function helper() {}"),
/// ]);
/// let graph = DependencyGraph::build(&files, &ScoringConfig::default().category_precedence);
///
/// assert_eq!(graph.get("index.ts").unwrap().category, FileCategory::Entry);
/// assert_eq!(graph.get("lib.ts").unwrap().imported_by, vec!["index.ts"]);
/// assert_eq!(graph.entry_points(), ["index.ts"]);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "GraphRepr", from = "GraphRepr")]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
    entry_points: Vec<String>,
    config_files: Vec<String>,
    test_files: Vec<String>,
    api_files: Vec<String>,
}

impl DependencyGraph {
    /// Build the graph from every record in `files`.
    ///
    /// Each file's text comes from the shared content cache; a file that
    /// cannot be read still gets a node, with no imports or exports.
    pub fn build(files: &FileSet, precedence: &[FileCategory]) -> Self {
        let mut nodes = Vec::with_capacity(files.len());

        for record in files.records() {
            let language = SourceLanguage::from_extension(&record.extension);
            let (imports, exports) = match files.content(&record.relative_path) {
                Some(text) => (
                    extract_imports(&text, language),
                    extract_exports(&text, language),
                ),
                None => (Vec::new(), Vec::new()),
            };

            nodes.push(GraphNode {
                path: record.relative_path.clone(),
                imports,
                imported_by: Vec::new(),
                exports,
                category: categorize(&record.relative_path, precedence),
                size: record.size,
                priority: None,
            });
        }

        let mut graph = Self::from_nodes(nodes);
        graph.link_importers();
        tracing::debug!(nodes = graph.nodes.len(), "dependency graph built");
        graph
    }

    fn from_nodes(nodes: Vec<GraphNode>) -> Self {
        let mut graph = Self {
            nodes: Vec::with_capacity(nodes.len()),
            ..Self::default()
        };
        for node in nodes {
            if graph.index.contains_key(&node.path) {
                continue;
            }
            let list = match node.category {
                FileCategory::Entry => Some(&mut graph.entry_points),
                FileCategory::Config => Some(&mut graph.config_files),
                FileCategory::Test => Some(&mut graph.test_files),
                FileCategory::Api => Some(&mut graph.api_files),
                _ => None,
            };
            if let Some(list) = list {
                list.push(node.path.clone());
            }
            graph.index.insert(node.path.clone(), graph.nodes.len());
            graph.nodes.push(node);
        }
        graph
    }

    /// Rebuild reverse edges from scratch over all resolved imports.
    fn link_importers(&mut self) {
        for node in &mut self.nodes {
            node.imported_by.clear();
        }

        let edges: Vec<(usize, usize)> = (0..self.nodes.len())
            .flat_map(|from| {
                self.resolved_indices(from)
                    .into_iter()
                    .filter(move |&to| to != from)
                    .map(move |to| (from, to))
            })
            .collect();

        for (from, to) in edges {
            let importer = self.nodes[from].path.clone();
            let target = &mut self.nodes[to];
            if !target.imported_by.contains(&importer) {
                target.imported_by.push(importer);
            }
        }
    }

    fn resolved_indices(&self, idx: usize) -> Vec<usize> {
        let node = &self.nodes[idx];
        let language = SourceLanguage::from_extension(&prism_core::extension_of(&node.path));
        let mut out = Vec::new();
        for spec in &node.imports {
            if let Some(target) = resolve_specifier(&node.path, spec, language, &self.index) {
                if !out.contains(&target) {
                    out.push(target);
                }
            }
        }
        out
    }

    /// Paths that `path`'s imports resolve to, in import order.
    pub fn resolved_imports(&self, path: &str) -> Vec<&str> {
        let Some(&idx) = self.index.get(path) else {
            return Vec::new();
        };
        self.resolved_indices(idx)
            .into_iter()
            .map(|i| self.nodes[i].path.as_str())
            .collect()
    }

    pub fn get(&self, path: &str) -> Option<&GraphNode> {
        self.index.get(path).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter()
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut GraphNode> {
        self.nodes.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node path, sorted.
    pub fn sorted_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.nodes.iter().map(|n| n.path.clone()).collect();
        paths.sort();
        paths
    }

    /// Nodes ordered by priority descending, ties in insertion order.
    pub fn sorted_by_priority(&self) -> Vec<&GraphNode> {
        let mut nodes: Vec<&GraphNode> = self.nodes.iter().collect();
        nodes.sort_by_key(|n| std::cmp::Reverse(n.score()));
        nodes
    }

    pub fn entry_points(&self) -> &[String] {
        &self.entry_points
    }

    pub fn config_files(&self) -> &[String] {
        &self.config_files
    }

    pub fn test_files(&self) -> &[String] {
        &self.test_files
    }

    pub fn api_files(&self) -> &[String] {
        &self.api_files
    }
}

/// Resolve an import specifier written in `from` to a known file index.
fn resolve_specifier(
    from: &str,
    spec: &str,
    language: SourceLanguage,
    known: &HashMap<String, usize>,
) -> Option<usize> {
    match language {
        SourceLanguage::Python => resolve_python(from, spec, known),
        _ => resolve_relative(from, spec, known),
    }
}

fn resolve_relative(from: &str, spec: &str, known: &HashMap<String, usize>) -> Option<usize> {
    if !(spec.starts_with('.') || spec.starts_with('/')) {
        return None;
    }

    let joined = match spec.strip_prefix('/') {
        Some(rooted) => rooted.to_string(),
        None => join(parent_dir(from), spec),
    };
    let base = normalize(&joined);

    if let Some(&idx) = known.get(&base) {
        return Some(idx);
    }
    for suffix in RESOLVE_SUFFIXES {
        if let Some(&idx) = known.get(&format!("{base}{suffix}")) {
            return Some(idx);
        }
    }
    spec.strip_prefix("./").and_then(|s| known.get(s).copied())
}

/// Relative Python imports (`from .models import X`) map dots to
/// directories: one dot is the importer's package, each extra dot climbs.
fn resolve_python(from: &str, spec: &str, known: &HashMap<String, usize>) -> Option<usize> {
    let module = spec.trim_start_matches('.');
    let dots = spec.len() - module.len();
    if dots == 0 {
        return None;
    }

    let mut dir = parent_dir(from).to_string();
    for _ in 1..dots {
        dir = parent_dir(&dir).to_string();
    }

    let candidates = if module.is_empty() {
        vec![join(&dir, "__init__.py")]
    } else {
        let module_path = join(&dir, &module.replace('.', "/"));
        vec![format!("{module_path}.py"), format!("{module_path}/__init__.py")]
    };
    candidates
        .iter()
        .find_map(|c| known.get(normalize(c).as_str()).copied())
}

fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

fn join(dir: &str, rest: &str) -> String {
    if dir.is_empty() {
        rest.to_string()
    } else {
        format!("{dir}/{rest}")
    }
}

/// Collapse `.` and `..` segments. `..` past the root is dropped.
fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Wire shape: `nodes` is a JSON object keyed by path, in insertion order.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRepr {
    nodes: NodeMap,
    entry_points: Vec<String>,
    config_files: Vec<String>,
    test_files: Vec<String>,
    api_files: Vec<String>,
}

struct NodeMap(Vec<GraphNode>);

impl From<DependencyGraph> for GraphRepr {
    fn from(graph: DependencyGraph) -> Self {
        Self {
            nodes: NodeMap(graph.nodes),
            entry_points: graph.entry_points,
            config_files: graph.config_files,
            test_files: graph.test_files,
            api_files: graph.api_files,
        }
    }
}

impl From<GraphRepr> for DependencyGraph {
    fn from(repr: GraphRepr) -> Self {
        let mut graph = Self::from_nodes(repr.nodes.0);
        graph.entry_points = repr.entry_points;
        graph.config_files = repr.config_files;
        graph.test_files = repr.test_files;
        graph.api_files = repr.api_files;
        graph
    }
}

impl Serialize for NodeMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for node in &self.0 {
            map.serialize_entry(&node.path, node)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for NodeMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NodeMapVisitor;

        impl<'de> Visitor<'de> for NodeMapVisitor {
            type Value = NodeMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of relative paths to graph nodes")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<NodeMap, A::Error> {
                let mut nodes = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((path, mut node)) = access.next_entry::<String, GraphNode>()? {
                    node.path = path;
                    nodes.push(node);
                }
                Ok(NodeMap(nodes))
            }
        }

        deserializer.deserialize_map(NodeMapVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::{FileRecord, ScoringConfig};

    fn build(files: Vec<(&str, &str)>) -> DependencyGraph {
        let records = files
            .into_iter()
            .map(|(p, c)| FileRecord::inline(p, c))
            .collect();
        DependencyGraph::build(
            &FileSet::new(records),
            &ScoringConfig::default().category_precedence,
        )
    }

    #[test]
    fn bare_specifiers_produce_no_edges() {
        let graph = build(vec![
            ("src/app.ts", "import React from 'react';\nimport lodash from 'lodash/fp';"),
            ("react.ts", "export default 1;"),
        ]);
        assert!(graph.resolved_imports("src/app.ts").is_empty());
        assert!(graph.get("react.ts").unwrap().imported_by.is_empty());
        assert_eq!(graph.get("src/app.ts").unwrap().imports, vec!["react", "lodash/fp"]);
    }

    #[test]
    fn resolves_extensions_and_index_files() {
        let graph = build(vec![
            ("src/pages/home.tsx", "import { Nav } from '../components/nav';\nimport * as u from '../utils';"),
            ("src/components/nav.tsx", "export const Nav = 1;"),
            ("src/utils/index.ts", "export const u = 1;"),
        ]);
        assert_eq!(
            graph.resolved_imports("src/pages/home.tsx"),
            vec!["src/components/nav.tsx", "src/utils/index.ts"]
        );
    }

    #[test]
    fn exact_match_wins_over_suffixes() {
        let graph = build(vec![
            ("a.js", "require('./data.json'); require('./b');"),
            ("data.json", "{}"),
            ("b", "plain"),
            ("b.ts", "export const b = 1;"),
        ]);
        assert_eq!(graph.resolved_imports("a.js"), vec!["data.json", "b"]);
    }

    #[test]
    fn root_relative_specifier() {
        let graph = build(vec![
            ("src/deep/x.ts", "import '/src/shared/y';"),
            ("src/shared/y.ts", ""),
        ]);
        assert_eq!(graph.resolved_imports("src/deep/x.ts"), vec!["src/shared/y.ts"]);
    }

    #[test]
    fn parent_segments_past_root_are_clamped() {
        let graph = build(vec![("a.ts", "import '../../b';"), ("b.ts", "")]);
        assert_eq!(graph.resolved_imports("a.ts"), vec!["b.ts"]);
    }

    #[test]
    fn python_relative_imports_resolve() {
        let graph = build(vec![
            ("app/views.py", "from .models import User\nfrom ..shared import util\nimport os\n"),
            ("app/models.py", "class User:\n    pass\n"),
            ("shared/__init__.py", ""),
        ]);
        assert_eq!(
            graph.resolved_imports("app/views.py"),
            vec!["app/models.py", "shared/__init__.py"]
        );
        assert_eq!(graph.get("app/models.py").unwrap().imported_by, vec!["app/views.py"]);
    }

    #[test]
    fn reverse_edges_are_deduplicated() {
        let graph = build(vec![
            ("a.ts", "import x from './b';\nimport y from './b.ts';\nconst z = require('./b');"),
            ("b.ts", "export default 1;"),
        ]);
        assert_eq!(graph.get("b.ts").unwrap().imported_by, vec!["a.ts"]);
    }

    #[test]
    fn self_imports_are_ignored() {
        let graph = build(vec![("a.ts", "import './a';")]);
        assert!(graph.get("a.ts").unwrap().imported_by.is_empty());
    }

    #[test]
    fn derived_lists_follow_category() {
        let graph = build(vec![
            ("index.ts", ""),
            ("package.json", "{}"),
            ("src/a.test.ts", ""),
            ("pages/api/users.ts", ""),
            ("README.md", "# hi"),
        ]);
        assert_eq!(graph.entry_points(), ["index.ts"]);
        assert_eq!(graph.config_files(), ["package.json"]);
        assert_eq!(graph.test_files(), ["src/a.test.ts"]);
        assert_eq!(graph.api_files(), ["pages/api/users.ts"]);
    }

    #[test]
    fn json_keeps_insertion_order_and_camel_case() {
        let graph = build(vec![
            ("z.ts", "import './a';"),
            ("a.ts", "export const a = 1;"),
        ]);
        let json = serde_json::to_string(&graph).unwrap();
        let z = json.find("\"z.ts\":").unwrap();
        let a = json.find("\"a.ts\":").unwrap();
        assert!(z < a);
        assert!(json.contains("\"importedBy\":[\"z.ts\"]"));
        assert!(json.contains("\"entryPoints\""));

        let back: DependencyGraph = serde_json::from_str(&json).unwrap();
        let order: Vec<&str> = back.nodes().map(|n| n.path.as_str()).collect();
        assert_eq!(order, vec!["z.ts", "a.ts"]);
        assert_eq!(back.resolved_imports("z.ts"), vec!["a.ts"]);
    }

    #[test]
    fn normalize_collapses_segments() {
        assert_eq!(normalize("src/./a/../b"), "src/b");
        assert_eq!(normalize("../x"), "x");
        assert_eq!(normalize("a//b/"), "a/b");
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use prism_core::FileRecord;

/// The scanned file set plus the one canonical content cache for a run.
///
/// Graph construction and every review pass read text through
/// [`FileSet::content`], so each file is loaded from disk at most once.
/// A record that fails to load is cached as empty text.
///
/// # Examples
///
/// ```
/// use prism_core::FileRecord;
/// use prism_graph::source::FileSet;
///
/// let files = FileSet::new(vec![FileRecord::inline("a.ts", "let a = 1;")]);
/// assert_eq!(files.len(), 1);
/// assert_eq!(files.content("a.ts").as_deref(), Some("let a = 1;"));
/// assert!(files.content("missing.ts").is_none());
/// ```
#[derive(Debug, Default)]
pub struct FileSet {
    records: Vec<FileRecord>,
    index: HashMap<String, usize>,
    cache: Mutex<HashMap<String, Arc<str>>>,
}

impl FileSet {
    /// Build a file set. Later records with an already-seen relative path are dropped.
    pub fn new(records: Vec<FileRecord>) -> Self {
        let mut kept = Vec::with_capacity(records.len());
        let mut index = HashMap::with_capacity(records.len());
        let mut cache = HashMap::new();

        for mut record in records {
            if index.contains_key(&record.relative_path) {
                tracing::debug!(file = %record.relative_path, "duplicate file record ignored");
                continue;
            }
            if let Some(content) = record.content.take() {
                cache.insert(record.relative_path.clone(), Arc::from(content));
            }
            index.insert(record.relative_path.clone(), kept.len());
            kept.push(record);
        }

        Self {
            records: kept,
            index,
            cache: Mutex::new(cache),
        }
    }

    /// All records, in scan order.
    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    /// Look up a record by relative path.
    pub fn get(&self, relative_path: &str) -> Option<&FileRecord> {
        self.index.get(relative_path).map(|&i| &self.records[i])
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.index.contains_key(relative_path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Text of the file at `relative_path`, loading it on first access.
    ///
    /// Returns `None` only for paths outside the set. Read failures yield
    /// empty text.
    pub fn content(&self, relative_path: &str) -> Option<Arc<str>> {
        let record = self.get(relative_path)?;

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(text) = cache.get(relative_path) {
            return Some(Arc::clone(text));
        }

        let text: Arc<str> = match std::fs::read_to_string(&record.path) {
            Ok(content) => Arc::from(content),
            Err(e) => {
                tracing::warn!(
                    file = %relative_path,
                    error = %e,
                    "failed to read file content, treating as empty"
                );
                Arc::from("")
            }
        };
        cache.insert(relative_path.to_string(), Arc::clone(&text));
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn on_disk(relative: &str, path: PathBuf) -> FileRecord {
        FileRecord {
            path,
            relative_path: relative.into(),
            extension: prism_core::extension_of(relative),
            size: 0,
            content: None,
        }
    }

    #[test]
    fn loads_from_disk_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.ts");
        std::fs::write(&file, "first").unwrap();

        let files = FileSet::new(vec![on_disk("a.ts", file.clone())]);
        assert_eq!(files.content("a.ts").as_deref(), Some("first"));

        std::fs::write(&file, "second").unwrap();
        assert_eq!(files.content("a.ts").as_deref(), Some("first"));
    }

    #[test]
    fn unreadable_file_is_empty() {
        let files = FileSet::new(vec![on_disk("gone.ts", PathBuf::from("/nonexistent/gone.ts"))]);
        assert_eq!(files.content("gone.ts").as_deref(), Some(""));
    }

    #[test]
    fn duplicate_paths_keep_first() {
        let files = FileSet::new(vec![
            FileRecord::inline("a.ts", "one"),
            FileRecord::inline("a.ts", "two"),
        ]);
        assert_eq!(files.len(), 1);
        assert_eq!(files.content("a.ts").as_deref(), Some("one"));
    }
}

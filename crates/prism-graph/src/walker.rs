use std::ffi::OsStr;
use std::io::Read;
use std::path::Path;

use prism_core::{extension_of, FileRecord, PrismError};

/// Maximum file size to process (1 MB).
const MAX_FILE_SIZE: u64 = 1_048_576;

/// Number of bytes to check for binary detection.
const BINARY_CHECK_SIZE: u64 = 8192;

/// Walk a repository, respecting `.gitignore`, returning text files.
///
/// Skips the `.git` directory, binary files, and files larger than 1 MB.
/// Hidden files are kept since dotfiles (`.env.example`, `.eslintrc`) are
/// review-relevant. Records are sorted by relative path and carry no
/// preloaded content.
///
/// # Errors
///
/// Returns [`PrismError::FileNotFound`] if `root` does not exist.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use prism_graph::walker::walk_repo;
///
/// let files = walk_repo(Path::new(".")).unwrap();
/// for f in &files {
///     println!("{} ({} bytes)", f.relative_path, f.size);
/// }
/// ```
pub fn walk_repo(root: &Path) -> Result<Vec<FileRecord>, PrismError> {
    if !root.exists() {
        return Err(PrismError::FileNotFound(root.to_path_buf()));
    }

    let walker = ignore::WalkBuilder::new(root)
        .hidden(false)
        .filter_entry(|entry| entry.file_name() != OsStr::new(".git"))
        .build();
    let mut files = Vec::new();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable walk entry");
                continue;
            }
        };

        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        let path = entry.path();

        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(_) => continue,
        };
        if metadata.len() > MAX_FILE_SIZE {
            tracing::debug!(path = %path.display(), size = metadata.len(), "skipping large file");
            continue;
        }

        if is_binary(path) {
            continue;
        }

        let relative = match path.strip_prefix(root) {
            Ok(r) => r,
            Err(_) => path,
        };
        let relative_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        files.push(FileRecord {
            path: path.to_path_buf(),
            extension: extension_of(&relative_path),
            relative_path,
            size: metadata.len(),
            content: None,
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

/// A file is binary if a NUL byte appears in its first 8 KB.
fn is_binary(path: &Path) -> bool {
    let Ok(file) = std::fs::File::open(path) else {
        return true;
    };
    let mut head = Vec::with_capacity(BINARY_CHECK_SIZE as usize);
    if file.take(BINARY_CHECK_SIZE).read_to_end(&mut head).is_err() {
        return true;
    }
    head.contains(&0)
}

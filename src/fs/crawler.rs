//! Directory crawling with exclusion and depth limits.
//!
//! Crawling is advisory: a missing root or an unreadable directory simply
//! contributes nothing to the result.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use glob::Pattern;
use tokio::fs;
use tracing::debug;

use super::path::PathResolver;

/// How deep a crawl may descend below its root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Depth {
    /// Descend into every non-excluded directory
    #[default]
    Unlimited,

    /// Read at most this many directory levels (1 = the root's children only)
    Limited(usize),
}

impl Depth {
    fn allows(&self, level: usize) -> bool {
        match self {
            Depth::Unlimited => true,
            Depth::Limited(max) => level < *max,
        }
    }
}

/// Directories pruned from a crawl.
///
/// Entries that look like paths (contain a separator, or start with `./`
/// or `~`) are resolved and compared against the full directory path.
/// Bare entries are glob patterns matched against the directory name.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    paths: Vec<PathBuf>,
    names: Vec<Pattern>,
}

impl Exclusions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an exclusion set from raw config entries
    pub fn from_entries<I, S>(resolver: &PathResolver, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut exclusions = Self::new();
        for entry in entries {
            exclusions.add(resolver, entry.as_ref());
        }
        exclusions
    }

    /// Add one entry
    pub fn add(&mut self, resolver: &PathResolver, entry: &str) {
        let entry = entry.trim();
        if entry.is_empty() {
            return;
        }

        if looks_like_path(entry) {
            self.paths.push(resolver.absolute(entry));
        } else if let Ok(pattern) =
            Pattern::new(entry).or_else(|_| Pattern::new(&Pattern::escape(entry)))
        {
            self.names.push(pattern);
        }
    }

    /// Add an already-absolute directory path
    pub fn add_path(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.names.is_empty()
    }

    /// Whether a directory (absolute path) is excluded
    pub fn matches(&self, dir: &Path) -> bool {
        if self.paths.iter().any(|p| p == dir) {
            return true;
        }
        match dir.file_name().and_then(|n| n.to_str()) {
            Some(name) => self.names.iter().any(|p| p.matches(name)),
            None => false,
        }
    }
}

fn looks_like_path(entry: &str) -> bool {
    entry.contains('/')
        || entry.contains('\\')
        || entry.starts_with('~')
        || entry == "."
        || entry == ".."
        || Path::new(entry).is_absolute()
}

/// Files and directories discovered by a crawl, in discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlResult {
    pub files: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
}

/// Crawl `root` (an absolute path) breadth-first.
///
/// Excluded directories are neither listed nor entered. Entries within one
/// directory are visited in name order. The root itself is never listed.
pub async fn crawl(root: &Path, exclusions: &Exclusions, depth: Depth) -> CrawlResult {
    let mut result = CrawlResult::default();

    let metadata = match fs::metadata(root).await {
        Ok(m) => m,
        Err(e) => {
            debug!(root = %root.display(), error = %e, "Crawl root not found");
            return result;
        }
    };

    if metadata.is_file() {
        result.files.push(root.to_path_buf());
        return result;
    }

    let mut queue: VecDeque<(PathBuf, usize)> = VecDeque::new();
    queue.push_back((root.to_path_buf(), 0));

    while let Some((dir, level)) = queue.pop_front() {
        if !depth.allows(level) {
            continue;
        }

        let mut entries = match read_sorted(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };

        for (path, is_dir, is_link) in entries.drain(..) {
            if is_dir {
                if exclusions.matches(&path) {
                    debug!(dir = %path.display(), "Excluded from crawl");
                    continue;
                }
                result.directories.push(path.clone());
                // Linked directories are listed but not entered
                if !is_link {
                    queue.push_back((path, level + 1));
                }
            } else {
                result.files.push(path);
            }
        }
    }

    result
}

/// Read a directory's entries sorted by name as (path, is_dir, is_symlink)
async fn read_sorted(dir: &Path) -> std::io::Result<Vec<(PathBuf, bool, bool)>> {
    let mut reader = fs::read_dir(dir).await?;
    let mut entries = Vec::new();

    while let Some(entry) = reader.next_entry().await? {
        let path = entry.path();
        let file_type = match entry.file_type().await {
            Ok(t) => t,
            Err(_) => continue,
        };

        if file_type.is_symlink() {
            let is_dir = fs::metadata(&path)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            entries.push((path, is_dir, true));
        } else {
            entries.push((path, file_type.is_dir(), false));
        }
    }

    entries.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_exclusion_entry_kinds() {
        let resolver = PathResolver::new("/proj");
        let exclusions = Exclusions::from_entries(&resolver, ["node_*", "./lib", "/abs/out"]);

        assert!(exclusions.matches(Path::new("/proj/src/node_modules")));
        assert!(exclusions.matches(Path::new("/proj/lib")));
        assert!(exclusions.matches(Path::new("/abs/out")));
        assert!(!exclusions.matches(Path::new("/proj/src/lib")));
        assert!(!exclusions.matches(Path::new("/proj/src")));
    }

    #[tokio::test]
    async fn test_crawl_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let result = crawl(&temp.path().join("nope"), &Exclusions::new(), Depth::Unlimited).await;
        assert_eq!(result, CrawlResult::default());
    }

    #[tokio::test]
    async fn test_crawl_unlimited_and_shallow() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        touch(&root.join("a.txt"));
        touch(&root.join("one/b.txt"));
        touch(&root.join("one/two/c.txt"));

        let deep = crawl(root, &Exclusions::new(), Depth::Unlimited).await;
        assert_eq!(deep.files.len(), 3);
        assert_eq!(deep.directories, vec![root.join("one"), root.join("one/two")]);

        let shallow = crawl(root, &Exclusions::new(), Depth::Limited(1)).await;
        assert_eq!(shallow.files, vec![root.join("a.txt")]);
        assert_eq!(shallow.directories, vec![root.join("one")]);
    }

    #[tokio::test]
    async fn test_crawl_prunes_excluded_directory() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        touch(&root.join("keep/a.txt"));
        touch(&root.join("skip/b.txt"));
        touch(&root.join("skip/deeper/c.txt"));

        let resolver = PathResolver::new(root);
        let exclusions = Exclusions::from_entries(&resolver, ["skip"]);
        let result = crawl(root, &exclusions, Depth::Unlimited).await;

        assert_eq!(result.files, vec![root.join("keep/a.txt")]);
        assert_eq!(result.directories, vec![root.join("keep")]);
    }
}

//! File records and the per-cycle project snapshot.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Canonical descriptor of one discovered file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// File name including extension
    pub name: String,

    /// Absolute path of the file
    pub full_path: PathBuf,

    /// Directory of the file relative to the project root
    pub relative_path: PathBuf,

    /// Mirrored directory inside the working tree
    pub working_path: PathBuf,

    /// Number of files depending on this one (filled in by compile plugins)
    pub dependents: usize,

    /// Files this one imports (filled in by compile plugins)
    pub imports: Vec<PathBuf>,
}

impl FileRecord {
    /// Build a record for `full_path`, mirroring its directory under
    /// `working_root`. Both roots must be absolute.
    pub fn new(project_root: &Path, working_root: &Path, full_path: PathBuf) -> Self {
        let name = full_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let dir = full_path.parent().unwrap_or(project_root);
        let relative_path = match dir.strip_prefix(project_root) {
            Ok(rel) => rel.to_path_buf(),
            // Outside the project: keep only the normal components so the
            // working path still lands inside the working tree
            Err(_) => dir
                .components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .collect(),
        };
        let working_path = working_root.join(&relative_path);

        Self {
            name,
            full_path,
            relative_path,
            working_path,
            dependents: 0,
            imports: Vec::new(),
        }
    }

    /// Extension without the dot
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.name).extension().and_then(|e| e.to_str())
    }

    /// Location of this file's copy inside the working tree
    pub fn working_file(&self) -> PathBuf {
        self.working_path.join(&self.name)
    }
}

/// Files, specs and directories discovered for one pipeline cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectState {
    pub files: Vec<FileRecord>,
    pub specs: Vec<FileRecord>,
    pub directories: Vec<PathBuf>,
}

impl ProjectState {
    /// Look up a source file by absolute path
    pub fn file(&self, full_path: &Path) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.full_path == full_path)
    }

    pub fn file_mut(&mut self, full_path: &Path) -> Option<&mut FileRecord> {
        self.files.iter_mut().find(|f| f.full_path == full_path)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.specs.is_empty() && self.directories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_path_mirrors_project_layout() {
        let record = FileRecord::new(
            Path::new("/proj"),
            Path::new("/proj/.kiln/tmp"),
            PathBuf::from("/proj/src/sub/b.js"),
        );

        assert_eq!(record.name, "b.js");
        assert_eq!(record.relative_path, PathBuf::from("src/sub"));
        assert_eq!(record.working_path, PathBuf::from("/proj/.kiln/tmp/src/sub"));
        assert_eq!(record.working_file(), PathBuf::from("/proj/.kiln/tmp/src/sub/b.js"));
        assert_eq!(record.extension(), Some("js"));
        assert_ne!(record.working_file(), record.full_path);
    }

    #[test]
    fn test_file_outside_project_stays_in_working_tree() {
        let record = FileRecord::new(
            Path::new("/proj"),
            Path::new("/proj/.kiln/tmp"),
            PathBuf::from("/shared/lib/c.js"),
        );
        assert_eq!(record.working_path, PathBuf::from("/proj/.kiln/tmp/shared/lib"));
    }

    #[test]
    fn test_lookup_by_full_path() {
        let record = FileRecord::new(Path::new("/p"), Path::new("/w"), PathBuf::from("/p/a.js"));
        let mut state = ProjectState {
            files: vec![record],
            ..Default::default()
        };

        assert!(state.file(Path::new("/p/a.js")).is_some());
        state.file_mut(Path::new("/p/a.js")).unwrap().dependents = 2;
        assert_eq!(state.files[0].dependents, 2);
        assert!(state.file(Path::new("/p/b.js")).is_none());
    }
}

//! Filesystem service.
//!
//! Every operation takes a path spec (see [`path::PathSpec`]), resolves it
//! against the project root, and reports failures as [`FsError`] values.
//!
//! - `path`: path spec resolution
//! - `crawler`: directory traversal with exclusions
//! - `watch`: debounced change notifications

pub mod crawler;
pub mod path;
pub mod watch;

use std::fmt::Display;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

use crate::core::scheduler::parallel;
use crate::domain::FileRecord;

pub use crawler::{crawl, CrawlResult, Depth, Exclusions};
pub use path::{PathResolver, PathSpec};
pub use watch::{WatchHandle, DEFAULT_DEBOUNCE};

/// Errors from filesystem operations
#[derive(Debug, Error)]
pub enum FsError {
    #[error("Failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to copy {} to {}: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("Failed to delete {}: {source}", path.display())]
    Delete { path: PathBuf, source: io::Error },

    #[error("Failed to link {} to {}: {source}", from.display(), to.display())]
    Link {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("Failed to stat {}: {source}", path.display())]
    Metadata { path: PathBuf, source: io::Error },

    #[error("Failed to transform {}: {message}", path.display())]
    Transform { path: PathBuf, message: String },

    #[error("Failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        source: notify::Error,
    },
}

/// File metadata exposed to plugins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    pub last_modified: DateTime<Utc>,
    pub len: u64,
    pub is_dir: bool,
}

/// Result of listing a tree as file records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileListing {
    pub files: Vec<FileRecord>,
    pub directories: Vec<PathBuf>,
}

/// Filesystem operations anchored at a project root
#[derive(Debug, Clone)]
pub struct FileSystem {
    resolver: PathResolver,
    debounce: Duration,
}

impl FileSystem {
    pub fn new(resolver: PathResolver) -> Self {
        Self {
            resolver,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Set the debounce window used by `watch`
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Resolve a spec, keeping `./` specs relative
    pub fn build_path(&self, spec: impl Into<PathSpec>) -> PathBuf {
        self.resolver.resolve(spec)
    }

    /// Read a whole file as UTF-8
    pub async fn read(&self, spec: impl Into<PathSpec>) -> Result<String, FsError> {
        let path = self.resolver.absolute(spec);
        fs::read_to_string(&path)
            .await
            .map_err(|source| FsError::Read { path, source })
    }

    /// Replace a whole file's contents
    pub async fn write(
        &self,
        spec: impl Into<PathSpec>,
        content: impl AsRef<[u8]>,
    ) -> Result<(), FsError> {
        let path = self.resolver.absolute(spec);
        fs::write(&path, content)
            .await
            .map_err(|source| FsError::Write { path, source })
    }

    /// Create a directory and any missing parents
    pub async fn ensure_path(&self, spec: impl Into<PathSpec>) -> Result<(), FsError> {
        let path = self.resolver.absolute(spec);
        fs::create_dir_all(&path)
            .await
            .map_err(|source| FsError::CreateDir { path, source })
    }

    pub async fn path_exists(&self, spec: impl Into<PathSpec>) -> bool {
        let path = self.resolver.absolute(spec);
        fs::try_exists(&path).await.unwrap_or(false)
    }

    /// Copy a file, creating the destination's parent directories first.
    /// Returns the absolute destination.
    pub async fn copy(
        &self,
        from: impl Into<PathSpec>,
        to: impl Into<PathSpec>,
    ) -> Result<PathBuf, FsError> {
        let from = self.resolver.absolute(from);
        let to = self.resolver.absolute(to);

        if let Some(parent) = to.parent() {
            self.ensure_path(parent).await?;
        }

        fs::copy(&from, &to).await.map_err(|source| FsError::Copy {
            from: from.clone(),
            to: to.clone(),
            source,
        })?;

        Ok(to)
    }

    /// Read `from`, apply `transform`, and write the result to `to`
    pub async fn transform<F, E>(
        &self,
        from: impl Into<PathSpec>,
        transform: F,
        to: impl Into<PathSpec>,
    ) -> Result<(), FsError>
    where
        F: FnOnce(String) -> Result<String, E>,
        E: Display,
    {
        let from = self.resolver.absolute(from);
        let to = self.resolver.absolute(to);
        let content = self.read(&from).await?;
        let modified = transform(content).map_err(|e| FsError::Transform {
            path: from.clone(),
            message: e.to_string(),
        })?;
        self.write(&to, modified).await
    }

    /// Delete a file or a directory tree. Missing paths are not an error.
    pub fn delete<'a>(&'a self, spec: impl Into<PathSpec>) -> BoxFuture<'a, Result<(), FsError>> {
        let path = self.resolver.absolute(spec);
        self.delete_path(path)
    }

    /// Removes a directory directly when empty; otherwise lists one level,
    /// deletes child files concurrently, recurses into child directories,
    /// and retries.
    fn delete_path(&self, path: PathBuf) -> BoxFuture<'_, Result<(), FsError>> {
        async move {
            let metadata = match fs::symlink_metadata(&path).await {
                Ok(m) => m,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(source) => return Err(FsError::Delete { path, source }),
            };

            if !metadata.is_dir() {
                return match fs::remove_file(&path).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                    Err(source) => Err(FsError::Delete { path, source }),
                };
            }

            match fs::remove_dir(&path).await {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(_) => {}
            }

            let children = crawl(&path, &Exclusions::new(), Depth::Limited(1)).await;
            debug!(
                dir = %path.display(),
                files = children.files.len(),
                directories = children.directories.len(),
                "Deleting directory contents"
            );

            let mut failures: Vec<FsError> = Vec::new();

            let file_results = parallel(children.files, None, |file| self.delete_path(file)).await;
            failures.extend(file_results.into_iter().filter_map(Result::err));

            let dir_results =
                parallel(children.directories, None, |dir| self.delete_path(dir)).await;
            failures.extend(dir_results.into_iter().filter_map(Result::err));

            match fs::remove_dir(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(source) => Err(failures
                    .into_iter()
                    .next()
                    .unwrap_or(FsError::Delete { path, source })),
            }
        }
        .boxed()
    }

    /// Create a directory symlink at `to` pointing at `from`
    pub async fn link(
        &self,
        from: impl Into<PathSpec>,
        to: impl Into<PathSpec>,
    ) -> Result<(), FsError> {
        let from = self.resolver.absolute(from);
        let to = self.resolver.absolute(to);

        #[cfg(unix)]
        let result = fs::symlink(&from, &to).await;
        #[cfg(windows)]
        let result = fs::symlink_dir(&from, &to).await;

        result.map_err(|source| FsError::Link { from, to, source })
    }

    pub async fn metadata(&self, spec: impl Into<PathSpec>) -> Result<FileMetadata, FsError> {
        let path = self.resolver.absolute(spec);
        let metadata = fs::metadata(&path)
            .await
            .map_err(|source| FsError::Metadata {
                path: path.clone(),
                source,
            })?;
        let modified = metadata
            .modified()
            .map_err(|source| FsError::Metadata { path, source })?;

        Ok(FileMetadata {
            last_modified: DateTime::<Utc>::from(modified),
            len: metadata.len(),
            is_dir: metadata.is_dir(),
        })
    }

    /// Crawl `root` and map every file to a record anchored at `working_root`
    pub async fn get_files(
        &self,
        root: impl Into<PathSpec>,
        working_root: impl Into<PathSpec>,
        exclusions: &Exclusions,
        depth: Depth,
    ) -> FileListing {
        let root = self.resolver.absolute(root);
        let working_root = self.resolver.absolute(working_root);
        let crawled = crawl(&root, exclusions, depth).await;

        let files = crawled
            .files
            .into_iter()
            .map(|file| FileRecord::new(self.resolver.base(), &working_root, file))
            .collect();

        FileListing {
            files,
            directories: crawled.directories,
        }
    }

    /// Watch a tree; `on_change` receives the first changed file of each
    /// debounce window
    pub fn watch<F>(&self, spec: impl Into<PathSpec>, on_change: F) -> Result<WatchHandle, FsError>
    where
        F: Fn(PathBuf) + Send + 'static,
    {
        let path = self.resolver.absolute(spec);
        watch::watch(&path, self.debounce, on_change)
            .map_err(|source| FsError::Watch { path, source })
    }
}

/// Whether a path is missing, used by callers that treat absence as empty
pub fn is_not_found(error: &FsError) -> bool {
    let source = match error {
        FsError::Read { source, .. }
        | FsError::Write { source, .. }
        | FsError::CreateDir { source, .. }
        | FsError::Copy { source, .. }
        | FsError::Delete { source, .. }
        | FsError::Link { source, .. }
        | FsError::Metadata { source, .. } => source,
        FsError::Transform { .. } | FsError::Watch { .. } => return false,
    };
    source.kind() == io::ErrorKind::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn service(root: &Path) -> FileSystem {
        FileSystem::new(PathResolver::new(root))
    }

    #[tokio::test]
    async fn test_read_write_relative_to_root() {
        let temp = TempDir::new().unwrap();
        let fs = service(temp.path());

        fs.write("./notes.txt", "hello").await.unwrap();
        assert_eq!(fs.read("./notes.txt").await.unwrap(), "hello");
        assert_eq!(
            std::fs::read_to_string(temp.path().join("notes.txt")).unwrap(),
            "hello"
        );
    }

    #[tokio::test]
    async fn test_read_missing_is_error_value() {
        let temp = TempDir::new().unwrap();
        let fs = service(temp.path());

        let err = fs.read("./missing.txt").await.unwrap_err();
        assert!(matches!(err, FsError::Read { .. }));
        assert!(is_not_found(&err));
    }

    #[tokio::test]
    async fn test_transform_reports_transform_errors() {
        let temp = TempDir::new().unwrap();
        let fs = service(temp.path());
        fs.write("./in.txt", "abc").await.unwrap();

        fs.transform("./in.txt", |c| Ok::<_, String>(c.to_uppercase()), "./out.txt")
            .await
            .unwrap();
        assert_eq!(fs.read("./out.txt").await.unwrap(), "ABC");

        let err = fs
            .transform("./in.txt", |_| Err("nope"), "./out.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::Transform { .. }));
    }
}

//! Path specification resolution.
//!
//! Paths reach the filesystem layer either as a single string or as an
//! ordered list of segments. Resolution is purely lexical:
//! - `./` prefixed specs stay relative (the marker is preserved)
//! - `~` is replaced with the home directory
//! - anything else relative is anchored at the project root

use std::path::{Component, Path, PathBuf};

/// A path given as one string or as segments joined in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSpec {
    Single(PathBuf),
    Segments(Vec<PathBuf>),
}

impl PathSpec {
    /// Join the spec into a single path without normalizing it
    pub fn joined(&self) -> PathBuf {
        match self {
            PathSpec::Single(path) => path.clone(),
            PathSpec::Segments(segments) => {
                let mut path = PathBuf::new();
                for segment in segments {
                    path.push(segment);
                }
                path
            }
        }
    }

    /// Whether the first segment starts with the current-directory marker
    fn is_local(&self) -> bool {
        let first = match self {
            PathSpec::Single(path) => Some(path.as_path()),
            PathSpec::Segments(segments) => segments.first().map(PathBuf::as_path),
        };
        matches!(
            first.and_then(|p| p.components().next()),
            Some(Component::CurDir)
        )
    }
}

impl From<&str> for PathSpec {
    fn from(value: &str) -> Self {
        Self::Single(PathBuf::from(value))
    }
}

impl From<String> for PathSpec {
    fn from(value: String) -> Self {
        Self::Single(PathBuf::from(value))
    }
}

impl From<&Path> for PathSpec {
    fn from(value: &Path) -> Self {
        Self::Single(value.to_path_buf())
    }
}

impl From<PathBuf> for PathSpec {
    fn from(value: PathBuf) -> Self {
        Self::Single(value)
    }
}

impl From<&PathBuf> for PathSpec {
    fn from(value: &PathBuf) -> Self {
        Self::Single(value.clone())
    }
}

impl<T: Into<PathBuf>> From<Vec<T>> for PathSpec {
    fn from(value: Vec<T>) -> Self {
        Self::Segments(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<PathBuf>, const N: usize> From<[T; N]> for PathSpec {
    fn from(value: [T; N]) -> Self {
        Self::Segments(value.into_iter().map(Into::into).collect())
    }
}

/// Resolves path specs against a project root and home directory
#[derive(Debug, Clone)]
pub struct PathResolver {
    base: PathBuf,
    home: Option<PathBuf>,
}

impl PathResolver {
    /// Create a resolver anchored at `base` using the current user's home
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: normalize(&base.into()),
            home: dirs::home_dir(),
        }
    }

    /// Create a resolver anchored at the process working directory
    pub fn from_current_dir() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    /// Override the home directory used for `~` expansion
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// The project root
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolve a spec, keeping `./` specs relative.
    pub fn resolve(&self, spec: impl Into<PathSpec>) -> PathBuf {
        let spec = spec.into();
        let joined = spec.joined();

        if spec.is_local() {
            let rest: PathBuf = joined.components().skip(1).collect();
            let rest = normalize(&rest);
            if rest.as_os_str().is_empty() {
                return PathBuf::from(".");
            }
            return Path::new(".").join(rest);
        }

        let mut components = joined.components();
        if let Some(Component::Normal(first)) = components.next() {
            if first == "~" {
                if let Some(ref home) = self.home {
                    return normalize(&home.join(components.as_path()));
                }
            }
        }

        if joined.is_absolute() {
            normalize(&joined)
        } else {
            normalize(&self.base.join(joined))
        }
    }

    /// Resolve a spec to an absolute path, anchoring `./` specs at the base
    pub fn absolute(&self, spec: impl Into<PathSpec>) -> PathBuf {
        let resolved = self.resolve(spec);
        if resolved.is_absolute() {
            resolved
        } else {
            normalize(&self.base.join(resolved))
        }
    }
}

/// Lexically normalize a path: drop `.` and fold `..` where possible
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

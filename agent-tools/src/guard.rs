//! Install-directory protection for filesystem-capable executors.

use std::fmt::Debug;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// A path refused by a [`PathGuard`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("access to {} is not allowed: it lies inside the protected directory {}", path.display(), root.display())]
pub struct PathDenied {
    /// Normalized path that was requested.
    pub path: PathBuf,
    /// Protected root containing it.
    pub root: PathBuf,
}

/// Predicate consulted before any filesystem operation.
pub trait PathGuard: Send + Sync + Debug {
    /// Returns an error if `path` must not be touched.
    ///
    /// # Errors
    ///
    /// Returns [`PathDenied`] naming the protected root.
    fn check(&self, path: &Path) -> Result<(), PathDenied>;
}

/// Refuses paths inside the runtime's own installation directories.
#[derive(Debug, Clone, Default)]
pub struct InstallDirGuard {
    roots: Vec<PathBuf>,
}

impl InstallDirGuard {
    /// Creates a guard protecting each of `roots`.
    #[must_use]
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            roots: roots
                .into_iter()
                .map(|root| normalize(root.as_ref()))
                .collect(),
        }
    }

    /// Protected roots after normalization.
    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl PathGuard for InstallDirGuard {
    fn check(&self, path: &Path) -> Result<(), PathDenied> {
        let normalized = normalize(path);
        match self.roots.iter().find(|root| normalized.starts_with(root)) {
            Some(root) => Err(PathDenied {
                path: normalized,
                root: root.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Lexically resolves `.` and `..`; relative paths are anchored at the
/// current directory when it is known.
fn normalize(path: &Path) -> PathBuf {
    let anchored = if path.is_relative() {
        std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    } else {
        path.to_path_buf()
    };

    let mut out = PathBuf::new();
    for component in anchored.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_paths_inside_roots() {
        let guard = InstallDirGuard::new(["/opt/agent"]);
        assert!(guard.check(Path::new("/opt/agent/config.toml")).is_err());
        assert!(guard.check(Path::new("/opt/agent")).is_err());
        assert!(guard.check(Path::new("/opt/agentic/file")).is_ok());
        assert!(guard.check(Path::new("/home/user/notes.md")).is_ok());
    }

    #[test]
    fn dot_dot_cannot_escape_into_roots() {
        let guard = InstallDirGuard::new(["/opt/agent"]);
        let err = guard
            .check(Path::new("/tmp/../opt/./agent/bin/run"))
            .unwrap_err();
        assert_eq!(err.root, PathBuf::from("/opt/agent"));
        assert!(err.to_string().contains("protected"));
    }

    #[test]
    fn empty_guard_allows_everything() {
        assert!(InstallDirGuard::default().check(Path::new("/")).is_ok());
    }
}

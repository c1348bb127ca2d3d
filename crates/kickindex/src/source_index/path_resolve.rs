//
// source_index/path_resolve.rs
//
// Resolution of import paths against the referencing file and library roots
//
// Search order is fixed: the referencing file's own directory first, then
// each library directory in the order given. The first candidate that
// exists wins. Hosts rely on this order to shadow library files with
// project-local copies.
//

use std::path::{Component, Path, PathBuf};

use super::content_provider::FileSystem;
use super::reference::ReferencedFileInfo;

/// Search roots for one referencing file
#[derive(Debug, Clone)]
pub struct SearchRoots<'a> {
    pub file_directory: &'a Path,
    pub library_directories: &'a [PathBuf],
}

impl<'a> SearchRoots<'a> {
    pub fn new(file_directory: &'a Path, library_directories: &'a [PathBuf]) -> Self {
        Self {
            file_directory,
            library_directories,
        }
    }

    /// Candidate absolute paths in search order
    pub fn candidates(&self, relative: &str) -> Vec<PathBuf> {
        let relative = Path::new(relative);
        if relative.is_absolute() {
            return normalize_path(relative).into_iter().collect();
        }
        std::iter::once(self.file_directory)
            .chain(self.library_directories.iter().map(PathBuf::as_path))
            .filter_map(|root| normalize_path(&root.join(relative)))
            .collect()
    }
}

/// Resolve a reference to the first existing candidate, or `None`.
pub async fn resolve_reference(
    fs: &dyn FileSystem,
    reference: &ReferencedFileInfo,
    roots: &SearchRoots<'_>,
) -> Option<PathBuf> {
    if reference.normalized_relative_path.is_empty() {
        log::trace!("Path resolution: empty path at line {}", reference.line);
        return None;
    }

    for candidate in roots.candidates(&reference.normalized_relative_path) {
        if fs.exists(&candidate).await {
            log::trace!(
                "Resolved '{}' to '{}'",
                reference.raw_relative_path,
                candidate.display()
            );
            return Some(candidate);
        }
    }

    log::trace!(
        "Failed to resolve '{}' from '{}' ({} library directories)",
        reference.raw_relative_path,
        roots.file_directory.display(),
        roots.library_directories.len()
    );
    None
}

/// Resolve library directories given relative to the project directory
pub fn absolutize_directories(base: &Path, dirs: &[PathBuf]) -> Vec<PathBuf> {
    dirs.iter()
        .filter_map(|dir| {
            if dir.is_absolute() {
                normalize_path(dir)
            } else {
                normalize_path(&base.join(dir))
            }
        })
        .collect()
}

/// Normalize a path by resolving . and .. components
pub fn normalize_path(path: &Path) -> Option<PathBuf> {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                // Only pop a Normal segment; RootDir and Prefix stay
                if let Some(last) = components.last() {
                    if matches!(last, Component::Normal(_)) {
                        components.pop();
                    }
                }
            }
            Component::CurDir => {}
            c => components.push(c),
        }
    }

    if components.is_empty() {
        return None;
    }

    let mut result = PathBuf::new();
    for c in components {
        result.push(c);
    }
    Some(result)
}

/// Path of `path` relative to `base`, or `path` itself when outside it
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

//! Confines client-supplied paths to a per-session root directory.

use crate::error::{Error, ErrorKind, Result};
use path_abs::PathAbs;
use std::path::{Path, PathBuf};

/// What a path is required to be, once confinement passes.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TypeMode {
    /// Must be a regular file.
    File,
    /// Must be a directory.
    Directory,
    /// No type constraint.
    None,
}

/// Whether a path is required to already exist.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ExistenceMode {
    /// The path must already exist on disk.
    MustExist,
    /// The path must not already exist on disk.
    MustNotExist,
    /// No existence constraint.
    DontCare,
}

/// Canonicalises `candidate` and checks that it lies within `root`, then enforces the given
/// type and existence constraints.
///
/// Canonicalisation is weak (`path_abs`'s lexical normalisation): path components need not
/// exist on disk, which lets `MustNotExist` destinations (e.g. a rename target) pass through
/// the same guard as existing sources.
pub fn verify(root: &Path, candidate: &Path, type_mode: TypeMode, existence_mode: ExistenceMode) -> Result<PathBuf> {
    let canonical_root = canonicalize(root)?;
    let canonical_candidate = canonicalize(candidate)?;

    if !is_confined(&canonical_root, &canonical_candidate) {
        return Err(Error::new(
            ErrorKind::AccessDenied,
            format!("{} escapes the confining root {}", candidate.display(), root.display()),
        ));
    }

    let exists = canonical_candidate.exists();
    match existence_mode {
        ExistenceMode::MustExist if !exists => {
            return Err(not_found_error(type_mode, &canonical_candidate));
        }
        ExistenceMode::MustNotExist if exists => {
            return Err(Error::new(
                ErrorKind::OverwriteError,
                format!("{} already exists", canonical_candidate.display()),
            ));
        }
        _ => {}
    }

    if exists {
        let is_dir = canonical_candidate.is_dir();
        match type_mode {
            TypeMode::File if is_dir => {
                return Err(Error::new(ErrorKind::IsDirectory, format!("{} is a directory", canonical_candidate.display())));
            }
            TypeMode::Directory if !is_dir => {
                return Err(Error::new(ErrorKind::NotDirectory, format!("{} is not a directory", canonical_candidate.display())));
            }
            _ => {}
        }
    }

    Ok(canonical_candidate)
}

fn not_found_error(type_mode: TypeMode, path: &Path) -> Error {
    let kind = match type_mode {
        TypeMode::File => ErrorKind::FileNotFound,
        TypeMode::Directory => ErrorKind::DirectoryNotFound,
        TypeMode::None => ErrorKind::PathNotFound,
    };
    Error::new(kind, format!("{} does not exist", path.display()))
}

fn is_confined(root: &Path, candidate: &Path) -> bool {
    candidate.starts_with(root)
}

fn canonicalize<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let abs = PathAbs::new(path).map_err(|e| Error::with_source(ErrorKind::AccessDenied, "failed to canonicalise path", e))?;
    Ok(abs.as_path().to_path_buf())
}

/// Resolves a path argument the way every command that takes one does: absolute inputs (those
/// beginning with `/`) are anchored at the user root, relative inputs at the working directory.
pub fn resolve(root: &Path, working_directory: &Path, input: &str) -> PathBuf {
    let input_path = Path::new(input);
    if input_path.is_absolute() {
        let mut joined = root.to_path_buf();
        for component in input_path.components() {
            if let std::path::Component::Normal(part) = component {
                joined.push(part);
            }
        }
        joined
    } else {
        working_directory.join(input_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn allows_paths_within_the_root() {
        let dir = tempdir().unwrap();
        let candidate = dir.path().join("notes.txt");
        let resolved = verify(dir.path(), &candidate, TypeMode::None, ExistenceMode::DontCare).unwrap();
        assert!(resolved.starts_with(dir.path()));
    }

    #[test]
    fn rejects_traversal_outside_the_root() {
        let dir = tempdir().unwrap();
        let candidate = dir.path().join("../escape.txt");
        let err = verify(dir.path(), &candidate, TypeMode::None, ExistenceMode::DontCare).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
    }

    #[test]
    fn must_exist_fails_for_missing_file() {
        let dir = tempdir().unwrap();
        let candidate = dir.path().join("ghost.txt");
        let err = verify(dir.path(), &candidate, TypeMode::File, ExistenceMode::MustExist).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }

    #[test]
    fn must_not_exist_fails_for_existing_file() {
        let dir = tempdir().unwrap();
        let candidate = dir.path().join("present.txt");
        std::fs::write(&candidate, b"x").unwrap();
        let err = verify(dir.path(), &candidate, TypeMode::None, ExistenceMode::MustNotExist).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OverwriteError);
    }

    #[test]
    fn resolve_anchors_absolute_paths_at_root() {
        let root = Path::new("/srv/alice");
        let cwd = Path::new("/srv/alice/docs");
        assert_eq!(resolve(root, cwd, "/reports/a.txt"), root.join("reports/a.txt"));
    }

    #[test]
    fn resolve_anchors_relative_paths_at_working_directory() {
        let root = Path::new("/srv/alice");
        let cwd = Path::new("/srv/alice/docs");
        assert_eq!(resolve(root, cwd, "a.txt"), cwd.join("a.txt"));
    }
}

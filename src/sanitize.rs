//! Mapping of archive-internal names onto host paths.
//!
//! Names use `\` as the separator; `/` is accepted too.  A name is accepted
//! only when every component is a plain file or directory name.  Anything
//! that could reach outside the output root (`..`, a leading separator, a
//! drive or stream component such as `C:`) is rejected rather than
//! rewritten, and the caller aborts the extraction.  A name ending in a
//! separator names a directory, not a file, and is rejected as well.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("unsafe entry path '{name}': rooted paths are not allowed")]
    Rooted { name: String },
    #[error("unsafe entry path '{name}': parent-directory component")]
    ParentDir { name: String },
    #[error("unsafe entry path '{name}': drive or stream component '{component}'")]
    Drive { name: String, component: String },
    #[error("unsafe entry path '{name}': no file name component")]
    Empty { name: String },
}

impl PathError {
    pub fn name(&self) -> &str {
        match self {
            PathError::Rooted { name }
            | PathError::ParentDir { name }
            | PathError::Drive { name, .. }
            | PathError::Empty { name } => name,
        }
    }
}

/// An entry name resolved against an output root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SanitizedPath {
    /// Host-relative path, only `Normal` components.
    pub relative: PathBuf,
    /// `root.join(relative)`.
    pub resolved: PathBuf,
}

/// Convert an archive name into a relative host path.
pub fn relative_path(name: &str) -> Result<PathBuf, PathError> {
    if name.starts_with(['\\', '/']) {
        return Err(PathError::Rooted { name: name.to_owned() });
    }
    if name.ends_with(['\\', '/']) {
        return Err(PathError::Empty { name: name.to_owned() });
    }

    let mut relative = PathBuf::new();
    for part in name.split(['\\', '/']) {
        match part {
            "" | "." => continue,
            ".."     => return Err(PathError::ParentDir { name: name.to_owned() }),
            p if p.contains(':') => {
                return Err(PathError::Drive { name: name.to_owned(), component: p.to_owned() });
            }
            p => relative.push(p),
        }
    }

    // The host may still see something other than a plain name in a part.
    if relative.as_os_str().is_empty()
        || !relative.components().all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(PathError::Empty { name: name.to_owned() });
    }
    Ok(relative)
}

/// Resolve `name` under `root`.  The result always starts with `root`.
pub fn sanitize_entry_path(name: &str, root: &Path) -> Result<SanitizedPath, PathError> {
    let relative = relative_path(name)?;
    let resolved = root.join(&relative);
    if !resolved.starts_with(root) {
        return Err(PathError::Rooted { name: name.to_owned() });
    }
    Ok(SanitizedPath { relative, resolved })
}

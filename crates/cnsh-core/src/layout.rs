//! On-disk install layout.
//!
//! Layout:
//! ```text
//! <root>/
//!   cnsh.lock
//!   cnsh_lib/
//!     <package-name>/  extracted archive contents
//!     @scope/<name>/  scoped packages nest one level deeper
//! ```
//!
//! `<root>` is the working directory for project-local installs and the
//! global directory (`$HOME/.cnsh-global` by default) for `-g` installs.

use std::path::{Component, Path, PathBuf};

use crate::error::{CnshError, Result};
use crate::lock::LOCK_FILE_NAME;

/// Directory under the root that holds one subdirectory per package.
pub const LIB_DIR_NAME: &str = "cnsh_lib";

/// Where packages are installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallScope {
    /// `<cwd>/cnsh_lib`
    Local,
    /// `<global root>/cnsh_lib`
    Global,
}

/// Path layout for one install root.
#[derive(Debug, Clone)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    /// Create a layout rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        InstallLayout { root: root.into() }
    }

    /// Get the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all installed packages.
    pub fn lib_dir(&self) -> PathBuf {
        self.root.join(LIB_DIR_NAME)
    }

    /// Path of the lock file for this root.
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE_NAME)
    }

    /// Install subdirectory for a package.
    pub fn package_dir(&self, name: &str) -> Result<PathBuf> {
        validate_package_name(name)?;
        Ok(self.lib_dir().join(name))
    }

    /// Where the archive for a package is downloaded before extraction.
    pub fn archive_path(&self, name: &str) -> Result<PathBuf> {
        let dir = self.package_dir(name)?;
        let base = name.rsplit('/').next().unwrap_or(name);
        Ok(dir.join(format!("{base}.tar.gz")))
    }

    /// The `@scope` directory holding a scoped package, `None` for unscoped names.
    pub fn scope_dir(&self, name: &str) -> Result<Option<PathBuf>> {
        validate_package_name(name)?;
        Ok(name
            .split_once('/')
            .map(|(scope, _)| self.lib_dir().join(scope)))
    }

    /// Whether a package's subdirectory exists.
    pub fn is_installed(&self, name: &str) -> Result<bool> {
        Ok(self.package_dir(name)?.is_dir())
    }

    /// Create the lib directory if needed.
    pub fn ensure_lib_dir(&self) -> Result<PathBuf> {
        let dir = self.lib_dir();
        std::fs::create_dir_all(&dir).map_err(|e| CnshError::io(&dir, e))?;
        Ok(dir)
    }
}

/// Check that a package name maps to exactly one directory under `cnsh_lib`.
///
/// Accepts `name` and `@scope/name`. Rejects anything that would escape the
/// lib directory or collide with another package's directory.
pub fn validate_package_name(name: &str) -> Result<()> {
    let invalid = |detail: &str| CnshError::InvalidPackageName {
        name: name.to_string(),
        detail: detail.to_string(),
    };

    if name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.contains('\\') {
        return Err(invalid("backslashes are not allowed"));
    }

    let segments: Vec<&str> = name.split('/').collect();
    match segments.as_slice() {
        [single] if single.starts_with('@') => {
            return Err(invalid("a bare scope names every package in it; use '@scope/name'"))
        }
        [_] => {}
        [scope, _] if scope.starts_with('@') && scope.len() > 1 => {}
        _ => return Err(invalid("expected 'name' or '@scope/name'")),
    }

    if segments.iter().any(|s| s.is_empty()) {
        return Err(invalid("empty path segment"));
    }
    for component in Path::new(name).components() {
        if !matches!(component, Component::Normal(_)) {
            return Err(invalid("path segments like '.', '..' or '/' are not allowed"));
        }
    }
    // `Path::components` folds interior `.` away, so check segments directly too.
    if segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(invalid("path segments like '.', '..' or '/' are not allowed"));
    }
    Ok(())
}

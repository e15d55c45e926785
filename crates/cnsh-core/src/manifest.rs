//! `package.json` project manifest.
//!
//! Only the fields cnsh reads or writes are typed; every other key is kept
//! in [`PackageManifest::extra`] so rewriting a manifest never drops data.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CnshError, Result};

/// File name of the project manifest.
pub const MANIFEST_FILE_NAME: &str = "package.json";

/// The project manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Production dependencies (name → version requirement).
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// Development dependencies (name → version requirement).
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
    /// Keys cnsh does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl PackageManifest {
    /// Manifest with the defaults `init -y` writes.
    pub fn with_defaults(name: &str) -> Self {
        let mut scripts = BTreeMap::new();
        scripts.insert(
            "test".to_string(),
            "echo \"Error: no test specified\" && exit 1".to_string(),
        );
        PackageManifest {
            name: name.to_string(),
            version: default_version(),
            description: String::new(),
            main: Some("index.js".to_string()),
            scripts,
            author: Some(serde_json::Value::String(String::new())),
            license: Some("ISC".to_string()),
            dependencies: BTreeMap::new(),
            dev_dependencies: BTreeMap::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Path of the manifest inside a project directory.
    pub fn path_in(project_dir: &Path) -> PathBuf {
        project_dir.join(MANIFEST_FILE_NAME)
    }

    /// Load `package.json` from a project directory.
    ///
    /// Fails with [`CnshError::ManifestNotFound`] if there is none.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = Self::path_in(project_dir);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CnshError::ManifestNotFound { path })
            }
            Err(e) => return Err(CnshError::io(&path, e)),
        };
        serde_json::from_str(&content).map_err(|e| CnshError::Parse {
            path,
            detail: e.to_string(),
        })
    }

    /// Write the manifest to a project directory, replacing any existing file.
    pub fn save(&self, project_dir: &Path) -> Result<PathBuf> {
        let path = Self::path_in(project_dir);
        let mut json = serde_json::to_string_pretty(self).map_err(|e| CnshError::Parse {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        json.push('\n');
        std::fs::write(&path, json).map_err(|e| CnshError::io(&path, e))?;
        Ok(path)
    }

    /// Union of production and development dependency names, sorted.
    pub fn dependency_set(&self) -> BTreeSet<String> {
        self.dependencies
            .keys()
            .chain(self.dev_dependencies.keys())
            .cloned()
            .collect()
    }
}

/// Turn a directory name into a default package name.
pub fn default_package_name(dir: &Path) -> String {
    dir.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.trim().to_lowercase().replace(char::is_whitespace, "-"))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "my-package".to_string())
}

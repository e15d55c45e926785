//! Package commands: add, remove, install.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cnsh_core::{
    CnshConfig, InstallAllOutcome, InstallLayout, InstallScope, InstallStage, PackageManager,
    RemoveOutcome,
};
use console::style;

/// Pick the install root for a scope.
pub fn install_root(cwd: &Path, scope: InstallScope, config: &CnshConfig) -> Result<PathBuf> {
    match scope {
        InstallScope::Local => Ok(cwd.to_path_buf()),
        InstallScope::Global => config
            .global_root()
            .context("cannot determine the home directory for a global install"),
    }
}

/// Build a package manager for the working directory and scope.
pub fn open_manager(cwd: &Path, scope: InstallScope) -> Result<PackageManager> {
    let config = CnshConfig::load(cwd)?;
    let root = install_root(cwd, scope, &config)?;
    tracing::debug!(root = %root.display(), registry = %config.registry_url, "Opening package manager");

    let manager = PackageManager::open(InstallLayout::new(root), &config)?
        .with_progress(Arc::new(|name: &str, stage: InstallStage| match stage {
            InstallStage::Resolving => println!("{}", style(format!("Installing {name}...")).dim()),
            InstallStage::Extracting => println!("{}", style(format!("Extracting {name}...")).dim()),
            _ => {}
        }));
    Ok(manager)
}

/// Run `cnsh add [-g] <name>`.
pub async fn add(cwd: &Path, scope: InstallScope, name: &str) -> Result<()> {
    cnsh_core::validate_package_name(name)?;
    let manager = open_manager(cwd, scope)?;

    match manager.install(name).await {
        Ok(installed) => {
            println!(
                "{} {}@{} installed successfully!",
                style("✔").green(),
                installed.name,
                installed.version
            );
            Ok(())
        }
        Err(e) => {
            println!("{} Failed to install {name}", style("✖").red());
            Err(e.into())
        }
    }
}

/// Run `cnsh remove [-g] <name>`.
pub async fn remove(cwd: &Path, scope: InstallScope, name: &str) -> Result<()> {
    cnsh_core::validate_package_name(name)?;
    let manager = open_manager(cwd, scope)?;

    match manager
        .remove(name)
        .await
        .with_context(|| format!("failed to remove {name}"))?
    {
        RemoveOutcome::Removed { .. } => {
            println!("{} {name} removed successfully!", style("✔").green());
        }
        RemoveOutcome::NotInstalled => {
            println!("{} {name} is not installed", style("ℹ").yellow());
        }
    }
    Ok(())
}

/// Run `cnsh install`.
///
/// Every dependency is attempted even if some fail; the command fails
/// afterwards if any of them did.
pub async fn install(cwd: &Path, scope: InstallScope) -> Result<()> {
    let manager = open_manager(cwd, scope)?;
    println!("Installing dependencies from package.json...");

    let outcome = manager
        .install_all(cwd)
        .await
        .context("failed to install dependencies")?;

    let report = match outcome {
        InstallAllOutcome::NothingToDo => {
            println!("{} No dependencies to install.", style("ℹ").yellow());
            return Ok(());
        }
        InstallAllOutcome::Completed(report) => report,
    };

    for installed in report.succeeded() {
        println!(
            "{} {}@{} installed successfully!",
            style("✔").green(),
            installed.name,
            installed.version
        );
    }
    for (name, error) in report.failed() {
        println!("{} Failed to install {name}: {error}", style("✖").red());
    }

    let total = report.results.len();
    let failed = report.failure_count();
    if failed > 0 {
        bail!("{failed} of {total} dependencies failed to install");
    }
    println!("{} All dependencies installed successfully!", style("✔").green());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnsh_core::{LockFile, PackageRecord};

    #[tokio::test]
    async fn remove_missing_package_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        remove(dir.path(), InstallScope::Local, "left-pad").await.unwrap();
        assert!(!dir.path().join("cnsh.lock").exists());
    }

    #[tokio::test]
    async fn remove_deletes_directory_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("cnsh_lib/left-pad/package");
        std::fs::create_dir_all(&pkg).unwrap();
        std::fs::write(pkg.join("index.js"), "module.exports = 1;").unwrap();
        let mut lock = LockFile::default();
        lock.upsert("left-pad", Some("https://r.example/lp.tgz".into()), Some("1.3.0".into()));
        lock.upsert("other", None, Some("1.0.0".into()));
        lock.persist(&dir.path().join("cnsh.lock")).unwrap();

        remove(dir.path(), InstallScope::Local, "left-pad").await.unwrap();

        assert!(!dir.path().join("cnsh_lib/left-pad").exists());
        let lock = LockFile::load(&dir.path().join("cnsh.lock")).unwrap();
        assert!(!lock.contains("left-pad"));
        assert_eq!(lock.get("other"), Some(&PackageRecord {
            tarball_url: None,
            version: Some("1.0.0".into()),
        }));
    }

    #[tokio::test]
    async fn install_with_empty_manifest_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name": "app", "version": "1.0.0", "dependencies": {}}"#,
        )
        .unwrap();

        install(dir.path(), InstallScope::Local).await.unwrap();
    }

    #[tokio::test]
    async fn install_without_manifest_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = install(dir.path(), InstallScope::Local).await.unwrap_err();
        assert!(format!("{err:#}").contains("package.json not found"));
    }

    #[tokio::test]
    async fn invalid_name_is_rejected_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let err = add(dir.path(), InstallScope::Local, "../outside").await.unwrap_err();
        assert!(err.to_string().contains("invalid package name"));
        assert!(!dir.path().join("cnsh_lib").exists());
    }

    #[tokio::test]
    async fn malformed_lock_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cnsh.lock"), "not json").unwrap();
        let err = remove(dir.path(), InstallScope::Local, "x").await.unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse"));
    }

    #[test]
    fn global_scope_uses_configured_root() {
        let config = CnshConfig {
            global_dir: Some(PathBuf::from("/opt/cnsh-global")),
            ..CnshConfig::default()
        };
        let cwd = Path::new("/work");
        assert_eq!(
            install_root(cwd, InstallScope::Global, &config).unwrap(),
            PathBuf::from("/opt/cnsh-global")
        );
        assert_eq!(
            install_root(cwd, InstallScope::Local, &config).unwrap(),
            PathBuf::from("/work")
        );
    }
}

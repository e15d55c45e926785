//! `cnsh publish`: hand the project to `npm publish`.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use cnsh_core::PackageManifest;
use console::style;
use tokio::process::Command;

#[cfg(windows)]
const NPM: &str = "npm.cmd";
#[cfg(not(windows))]
const NPM: &str = "npm";

/// `npm publish` exited unsuccessfully. `main` exits with the same code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishFailed {
    pub code: i32,
}

impl fmt::Display for PublishFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "npm publish exited with status {}", self.code)
    }
}

impl std::error::Error for PublishFailed {}

/// Run `cnsh publish` in the working directory.
pub async fn run(cwd: &Path) -> Result<()> {
    run_with(cwd, NPM).await
}

pub(crate) async fn run_with(project_dir: &Path, program: &str) -> Result<()> {
    let manifest = PackageManifest::load(project_dir)?;
    println!("Publishing {}@{}...", manifest.name, manifest.version);
    tracing::debug!(program, dir = %project_dir.display(), "Spawning publisher");

    let status = Command::new(program)
        .arg("publish")
        .current_dir(project_dir)
        .status()
        .await
        .with_context(|| format!("failed to run '{program} publish'"))?;

    if !status.success() {
        // Killed by a signal: no code to forward.
        let code = status.code().unwrap_or(1);
        return Err(PublishFailed { code }.into());
    }
    println!(
        "{} {}@{} published successfully!",
        style("✔").green(),
        manifest.name,
        manifest.version
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        PackageManifest::with_defaults("pub-test").save(dir.path()).unwrap();
        dir
    }

    #[tokio::test]
    async fn missing_manifest_fails_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_with(dir.path(), "definitely-not-a-real-program").await.unwrap_err();
        assert!(err.to_string().contains("package.json not found"));
    }

    #[tokio::test]
    async fn missing_program_is_reported() {
        let dir = project();
        let err = run_with(dir.path(), "definitely-not-a-real-program").await.unwrap_err();
        assert!(err.to_string().contains("failed to run"));
        assert!(err.downcast_ref::<PublishFailed>().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_publisher() {
        let dir = project();
        run_with(dir.path(), "true").await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_publisher_code_is_kept() {
        let dir = project();
        let err = run_with(dir.path(), "false").await.unwrap_err();
        assert_eq!(err.downcast_ref::<PublishFailed>(), Some(&PublishFailed { code: 1 }));
    }
}

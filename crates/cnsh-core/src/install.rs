//! Install/remove orchestration.
//!
//! [`PackageManager`] sequences registry → fetcher → extractor → lock store
//! for one package, and fans out over a manifest's dependency set for bulk
//! installs.
//!
//! Per-package install stages:
//!
//! ```text
//! Resolving → Downloading → Extracting → Recording → Installed
//!      └───────────┴─────────────┴────────────┴──→ Failed
//! ```
//!
//! A failure at any stage aborts that package only. Nothing is retried.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::config::CnshConfig;
use crate::error::{CnshError, Result};
use crate::extract::{ArchiveExtractor, TarGzExtractor};
use crate::fetch::{verify_archive_size, ArchiveFetcher, HttpArchiveFetcher};
use crate::layout::InstallLayout;
use crate::lock::{LockHandle, LockStore, PackageRecord};
use crate::manifest::PackageManifest;
use crate::registry::{HttpRegistryClient, RegistryClient, Resolution};

/// Stage of a single package install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    Resolving,
    Downloading,
    Extracting,
    Recording,
    Installed,
    Failed,
}

impl std::fmt::Display for InstallStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InstallStage::Resolving => "resolving",
            InstallStage::Downloading => "downloading",
            InstallStage::Extracting => "extracting",
            InstallStage::Recording => "recording",
            InstallStage::Installed => "installed",
            InstallStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Callback invoked on every stage transition with the package name.
pub type InstallProgressCallback = Arc<dyn Fn(&str, InstallStage) + Send + Sync>;

/// A successfully installed package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    pub tarball_url: String,
    /// Install subdirectory holding the extracted contents.
    pub path: PathBuf,
    /// Number of archive entries extracted.
    pub entries: usize,
    /// Size of the downloaded archive.
    pub archive_bytes: u64,
}

/// Result of removing a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The subdirectory was deleted and the lock record dropped.
    Removed { path: PathBuf },
    /// There was nothing to remove. Not an error.
    NotInstalled,
}

/// Per-package results of a bulk install, sorted by package name.
#[derive(Debug)]
pub struct InstallReport {
    pub results: Vec<(String, Result<InstalledPackage>)>,
}

impl InstallReport {
    /// Packages that installed successfully.
    pub fn succeeded(&self) -> impl Iterator<Item = &InstalledPackage> {
        self.results.iter().filter_map(|(_, r)| r.as_ref().ok())
    }

    /// Packages that failed, with their errors.
    pub fn failed(&self) -> impl Iterator<Item = (&str, &CnshError)> {
        self.results
            .iter()
            .filter_map(|(name, r)| r.as_ref().err().map(|e| (name.as_str(), e)))
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    /// Whether every package installed.
    pub fn all_succeeded(&self) -> bool {
        self.failure_count() == 0
    }
}

/// Result of a bulk install.
#[derive(Debug)]
pub enum InstallAllOutcome {
    /// The manifest declares no dependencies. Not an error.
    NothingToDo,
    /// Every declared dependency was attempted.
    Completed(InstallReport),
}

/// Installs and removes packages under one install root.
pub struct PackageManager {
    layout: InstallLayout,
    lock: LockHandle,
    registry: Arc<dyn RegistryClient>,
    fetcher: Arc<dyn ArchiveFetcher>,
    extractor: Arc<dyn ArchiveExtractor>,
    min_archive_bytes: u64,
    max_concurrent_installs: usize,
    progress: Option<InstallProgressCallback>,
}

impl std::fmt::Debug for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageManager")
            .field("layout", &self.layout)
            .field("lock", &self.lock.path())
            .field("min_archive_bytes", &self.min_archive_bytes)
            .field("max_concurrent_installs", &self.max_concurrent_installs)
            .finish()
    }
}

impl PackageManager {
    /// Create a manager talking to the configured HTTP registry.
    ///
    /// Opens the lock store for `layout`, so a malformed `cnsh.lock` is
    /// reported here. Must be called from within a Tokio runtime.
    pub fn open(layout: InstallLayout, config: &CnshConfig) -> Result<Self> {
        let registry = HttpRegistryClient::new(&config.registry_url, config.request_timeout())?;
        let fetcher = HttpArchiveFetcher::new(config.request_timeout())?;
        let lock = LockStore::open(layout.lock_path())?;

        Ok(Self::with_components(
            layout,
            lock,
            Arc::new(registry),
            Arc::new(fetcher),
            Arc::new(TarGzExtractor),
        )
        .with_min_archive_bytes(config.min_archive_bytes)
        .with_max_concurrent_installs(config.max_concurrent_installs))
    }

    /// Create a manager from explicit components.
    pub fn with_components(
        layout: InstallLayout,
        lock: LockHandle,
        registry: Arc<dyn RegistryClient>,
        fetcher: Arc<dyn ArchiveFetcher>,
        extractor: Arc<dyn ArchiveExtractor>,
    ) -> Self {
        let defaults = CnshConfig::default();
        PackageManager {
            layout,
            lock,
            registry,
            fetcher,
            extractor,
            min_archive_bytes: defaults.min_archive_bytes,
            max_concurrent_installs: defaults.max_concurrent_installs,
            progress: None,
        }
    }

    pub fn with_min_archive_bytes(mut self, bytes: u64) -> Self {
        self.min_archive_bytes = bytes;
        self
    }

    pub fn with_max_concurrent_installs(mut self, limit: usize) -> Self {
        self.max_concurrent_installs = limit.max(1);
        self
    }

    pub fn with_progress(mut self, callback: InstallProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    pub fn lock(&self) -> &LockHandle {
        &self.lock
    }

    /// Install the latest version of `name`.
    ///
    /// On failure nothing is recorded. If the package directory was created
    /// by this call it is removed again; an earlier install of the same
    /// package keeps its directory and lock record.
    pub async fn install(&self, name: &str) -> Result<InstalledPackage> {
        let result = self.try_install(name).await;
        match &result {
            Ok(installed) => {
                info!(
                    package = name,
                    version = %installed.version,
                    entries = installed.entries,
                    "Package installed"
                );
                self.report(name, InstallStage::Installed);
            }
            Err(e) => {
                warn!(package = name, error = %e, "Package install failed");
                self.report(name, InstallStage::Failed);
            }
        }
        result
    }

    async fn try_install(&self, name: &str) -> Result<InstalledPackage> {
        let package_dir = self.layout.package_dir(name)?;

        self.report(name, InstallStage::Resolving);
        let resolution = self.registry.resolve(name).await?;
        debug!(
            package = name,
            version = %resolution.version,
            url = %resolution.tarball_url,
            "Resolved package"
        );

        let existed = package_dir.is_dir();
        match self.populate(&resolution, &package_dir).await {
            Ok(installed) => Ok(installed),
            Err(e) => {
                self.discard(name, &package_dir, existed).await;
                Err(e)
            }
        }
    }

    /// Download, extract and record a resolved package into `package_dir`.
    async fn populate(
        &self,
        resolution: &Resolution,
        package_dir: &Path,
    ) -> Result<InstalledPackage> {
        let name = resolution.name.as_str();
        tokio::fs::create_dir_all(package_dir)
            .await
            .map_err(|e| CnshError::io(package_dir, e))?;

        self.report(name, InstallStage::Downloading);
        let archive = self.layout.archive_path(name)?;
        self.fetcher
            .fetch(name, &resolution.tarball_url, &archive)
            .await?;
        let archive_bytes = verify_archive_size(name, &archive, self.min_archive_bytes)?;

        self.report(name, InstallStage::Extracting);
        let entries = self.extract(name, &archive, package_dir).await?;
        tokio::fs::remove_file(&archive)
            .await
            .map_err(|e| CnshError::io(&archive, e))?;

        self.report(name, InstallStage::Recording);
        self.lock
            .upsert(
                name,
                PackageRecord::new(&resolution.tarball_url, &resolution.version),
            )
            .await?;

        Ok(InstalledPackage {
            name: name.to_string(),
            version: resolution.version.clone(),
            tarball_url: resolution.tarball_url.clone(),
            path: package_dir.to_path_buf(),
            entries,
            archive_bytes,
        })
    }

    async fn extract(&self, name: &str, archive: &Path, dest: &Path) -> Result<usize> {
        let extractor = Arc::clone(&self.extractor);
        let (task_name, archive, dest) = (name.to_string(), archive.to_path_buf(), dest.to_path_buf());
        tokio::task::spawn_blocking(move || extractor.extract(&task_name, &archive, &dest))
            .await
            .map_err(|e| CnshError::Extraction {
                name: name.to_string(),
                detail: format!("extraction task failed: {e}"),
            })?
    }

    /// Undo the on-disk effects of a failed install.
    async fn discard(&self, name: &str, package_dir: &Path, existed: bool) {
        let cleanup = if existed {
            match self.layout.archive_path(name) {
                Ok(archive) if archive.exists() => tokio::fs::remove_file(&archive).await,
                _ => Ok(()),
            }
        } else if package_dir.exists() {
            tokio::fs::remove_dir_all(package_dir).await
        } else {
            Ok(())
        };
        if let Err(e) = cleanup {
            warn!(package = name, error = %e, "Failed to clean up after install failure");
        }
        if !existed {
            self.prune_scope_dir(name).await;
        }
    }

    /// Drop a scoped package's `@scope` directory once nothing is left in it.
    async fn prune_scope_dir(&self, name: &str) {
        let Ok(Some(scope_dir)) = self.layout.scope_dir(name) else {
            return;
        };
        let empty = match tokio::fs::read_dir(&scope_dir).await {
            Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
            Err(_) => false,
        };
        if !empty {
            return;
        }
        // Fails harmlessly if a sibling install repopulated it meanwhile.
        if let Err(e) = tokio::fs::remove_dir(&scope_dir).await {
            debug!(path = %scope_dir.display(), error = %e, "Scope directory kept");
        }
    }

    /// Remove an installed package and its lock record.
    pub async fn remove(&self, name: &str) -> Result<RemoveOutcome> {
        let package_dir = self.layout.package_dir(name)?;
        if !package_dir.is_dir() {
            info!(package = name, "Package is not installed");
            return Ok(RemoveOutcome::NotInstalled);
        }

        debug!(package = name, path = %package_dir.display(), "Deleting package directory");
        tokio::fs::remove_dir_all(&package_dir)
            .await
            .map_err(|e| CnshError::io(&package_dir, e))?;
        self.lock.remove(name).await?;
        self.prune_scope_dir(name).await;

        info!(package = name, "Package removed");
        Ok(RemoveOutcome::Removed { path: package_dir })
    }

    /// Install every dependency declared in `<project_dir>/package.json`.
    ///
    /// Installs run concurrently, at most `max_concurrent_installs` at a
    /// time. A failed package never cancels or rolls back its siblings; each
    /// result is reported in the returned [`InstallReport`].
    pub async fn install_all(&self, project_dir: &Path) -> Result<InstallAllOutcome> {
        let manifest = PackageManifest::load(project_dir)?;
        let names = manifest.dependency_set();
        if names.is_empty() {
            info!("No dependencies to install");
            return Ok(InstallAllOutcome::NothingToDo);
        }

        info!(
            count = names.len(),
            concurrency = self.max_concurrent_installs,
            "Installing dependencies"
        );
        let mut results: Vec<(String, Result<InstalledPackage>)> = futures::stream::iter(names)
            .map(|name| async move {
                let result = self.install(&name).await;
                (name, result)
            })
            .buffer_unordered(self.max_concurrent_installs)
            .collect()
            .await;
        results.sort_by(|a, b| a.0.cmp(&b.0));

        let report = InstallReport { results };
        info!(
            failed = report.failure_count(),
            total = report.results.len(),
            "Dependency install finished"
        );
        Ok(InstallAllOutcome::Completed(report))
    }

    fn report(&self, name: &str, stage: InstallStage) {
        debug!(package = name, stage = %stage, "Install stage");
        if let Some(progress) = &self.progress {
            progress(name, stage);
        }
    }
}

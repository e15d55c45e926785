//! Core of the cnsh package manager.
//!
//! Resolves package names against an npm-compatible registry, downloads and
//! extracts their archives into a per-package directory, and records every
//! install in the `cnsh.lock` file.
//!
//! # Architecture
//!
//! - **Registry client**: resolves a name to `{tarball URL, version}`
//! - **Archive fetcher**: streams an archive to disk
//! - **Archive extractor**: unpacks a `.tgz` into the package directory
//! - **Lock store**: single-writer actor owning `cnsh.lock`
//! - **Package manager**: sequences the above per package and fans out
//!   over a manifest's dependency set
//!
//! Every lock-file mutation goes through one [`LockHandle`], so concurrent
//! installs inside one invocation never lose each other's records.

pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod install;
pub mod layout;
pub mod lock;
pub mod manifest;
pub mod registry;

#[cfg(test)]
mod test_server;

// Re-exports for convenience.
pub use config::CnshConfig;
pub use error::{CnshError, ErrorKind, Result};
pub use extract::{ArchiveExtractor, TarGzExtractor};
pub use fetch::{verify_archive_size, ArchiveFetcher, HttpArchiveFetcher};
pub use install::{
    InstallAllOutcome, InstallProgressCallback, InstallReport, InstallStage, InstalledPackage,
    PackageManager, RemoveOutcome,
};
pub use layout::{validate_package_name, InstallLayout, InstallScope};
pub use lock::{LockFile, LockHandle, LockStore, PackageRecord, LOCK_FILE_NAME};
pub use manifest::{PackageManifest, MANIFEST_FILE_NAME};
pub use registry::{HttpRegistryClient, RegistryClient, Resolution};

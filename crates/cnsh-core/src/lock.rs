//! The `cnsh.lock` lock store.
//!
//! The file is a JSON object keyed by package name:
//!
//! ```text
//! {
//!   "left-pad": {
//!     "tarballUrl": "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz",
//!     "version": "1.3.0"
//!   }
//! }
//! ```
//!
//! [`LockFile`] is the plain value with load/upsert/remove/persist.
//! [`LockStore`] wraps it in a single-writer actor: one Tokio task owns the
//! file and applies each mutation as a full load-modify-persist cycle, one at
//! a time. Callers hold a cloneable [`LockHandle`] and are answered only after
//! the write has reached disk.
//!
//! Two separate `cnsh` processes writing the same lock file are not
//! coordinated; the last writer wins.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{CnshError, Result};

/// File name of the lock store, relative to the install root.
pub const LOCK_FILE_NAME: &str = "cnsh.lock";

/// Capacity of the actor's command queue.
const COMMAND_QUEUE_DEPTH: usize = 64;

/// Provenance of one installed package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    /// Archive URL the package was installed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tarball_url: Option<String>,
    /// Version reported by the registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl PackageRecord {
    pub fn new(tarball_url: impl Into<String>, version: impl Into<String>) -> Self {
        PackageRecord {
            tarball_url: Some(tarball_url.into()),
            version: Some(version.into()),
        }
    }
}

/// In-memory contents of a lock file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockFile {
    packages: BTreeMap<String, PackageRecord>,
}

impl LockFile {
    /// Load a lock file. A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(CnshError::io(path, e)),
        };
        Self::parse(&content).map_err(|e| CnshError::Parse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    fn parse(content: &str) -> serde_json::Result<Self> {
        // An empty file is what a crashed first write leaves behind.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(content)
    }

    /// Insert or replace the record for `name`. `None` fields are omitted.
    pub fn upsert(&mut self, name: &str, tarball_url: Option<String>, version: Option<String>) {
        self.packages.insert(
            name.to_string(),
            PackageRecord {
                tarball_url,
                version,
            },
        );
    }

    /// Delete the record for `name`. Returns whether a record was present.
    pub fn remove(&mut self, name: &str) -> bool {
        self.packages.remove(name).is_some()
    }

    /// Serialize the whole store to `path`, replacing its previous contents.
    ///
    /// The data is written to a temporary file beside `path` and renamed into
    /// place, so readers never observe a half-written lock file.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| CnshError::io(dir, e))?;

        let mut json = serde_json::to_string_pretty(self).map_err(|e| CnshError::Parse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        json.push('\n');

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| CnshError::io(dir, e))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| CnshError::io(tmp.path(), e))?;
        tmp.persist(path).map_err(|e| CnshError::io(path, e.error))?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&PackageRecord> {
        self.packages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Iterate records in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PackageRecord)> {
        self.packages.iter().map(|(name, record)| (name.as_str(), record))
    }
}

/// A request to the lock-store actor.
enum LockCommand {
    Upsert {
        name: String,
        record: PackageRecord,
        reply: oneshot::Sender<Result<()>>,
    },
    Remove {
        name: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    Snapshot {
        reply: oneshot::Sender<LockFile>,
    },
}

/// Owner of one lock file.
pub struct LockStore {
    path: PathBuf,
    current: LockFile,
    commands: mpsc::Receiver<LockCommand>,
}

impl LockStore {
    /// Load the lock file at `path` and start its owning task.
    ///
    /// Fails with [`CnshError::Parse`] if the file exists but is malformed, so
    /// a corrupt store is reported before any install begins. Must be called
    /// from within a Tokio runtime.
    pub fn open(path: impl Into<PathBuf>) -> Result<LockHandle> {
        let path = path.into();
        let current = LockFile::load(&path)?;
        debug!(path = %path.display(), entries = current.len(), "Lock store opened");

        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let store = LockStore {
            path: path.clone(),
            current,
            commands: rx,
        };
        tokio::spawn(store.run());

        Ok(LockHandle { path, commands: tx })
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                LockCommand::Upsert {
                    name,
                    record,
                    reply,
                } => {
                    let result = self
                        .mutate(move |lock| {
                            lock.upsert(&name, record.tarball_url, record.version)
                        })
                        .await;
                    let _ = reply.send(result);
                }
                LockCommand::Remove { name, reply } => {
                    let result = self.mutate(move |lock| lock.remove(&name)).await;
                    let _ = reply.send(result);
                }
                LockCommand::Snapshot { reply } => {
                    let _ = reply.send(self.current.clone());
                }
            }
        }
        debug!(path = %self.path.display(), "Lock store closed");
    }

    /// Reload, apply `change`, persist. The file work runs on the blocking
    /// pool; the in-memory view is only replaced once the write succeeded.
    async fn mutate<T, F>(&mut self, change: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut LockFile) -> T + Send + 'static,
    {
        let path = self.path.clone();
        let cycle = tokio::task::spawn_blocking(move || -> Result<(LockFile, T)> {
            let mut lock = LockFile::load(&path)?;
            let output = change(&mut lock);
            lock.persist(&path)?;
            Ok((lock, output))
        })
        .await
        .map_err(|e| CnshError::io(&self.path, std::io::Error::other(e)))?;

        match cycle {
            Ok((lock, output)) => {
                self.current = lock;
                Ok(output)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to update lock file");
                Err(e)
            }
        }
    }
}

/// Cloneable handle routing lock-file operations through the owning task.
#[derive(Debug, Clone)]
pub struct LockHandle {
    path: PathBuf,
    commands: mpsc::Sender<LockCommand>,
}

impl LockHandle {
    /// Path of the lock file this handle writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `name` as installed. Returns once the file is persisted.
    pub async fn upsert(&self, name: &str, record: PackageRecord) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(LockCommand::Upsert {
            name: name.to_string(),
            record,
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.closed())?
    }

    /// Forget `name`. Returns whether a record was present.
    pub async fn remove(&self, name: &str) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(LockCommand::Remove {
            name: name.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.closed())?
    }

    /// Current contents as last persisted by this store.
    pub async fn snapshot(&self) -> Result<LockFile> {
        let (reply, rx) = oneshot::channel();
        self.send(LockCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| self.closed())
    }

    /// Record for a single package, if any.
    pub async fn get(&self, name: &str) -> Result<Option<PackageRecord>> {
        Ok(self.snapshot().await?.get(name).cloned())
    }

    async fn send(&self, command: LockCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> CnshError {
        CnshError::LockStoreClosed {
            path: self.path.clone(),
        }
    }
}

impl std::fmt::Debug for LockCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockCommand::Upsert { name, .. } => write!(f, "Upsert({name})"),
            LockCommand::Remove { name, .. } => write!(f, "Remove({name})"),
            LockCommand::Snapshot { .. } => write!(f, "Snapshot"),
        }
    }
}

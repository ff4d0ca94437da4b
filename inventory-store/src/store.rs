//! File-backed record store
//!
//! Handles:
//! - First-run bootstrap when no collection exists yet
//! - Exclusive locking of the read-modify-write cycle across processes
//! - Atomic rewrite through a temporary file renamed over the target

use crate::collection::{MergeAction, RecordCollection};
use crate::error::{Result, StoreError};
use crate::policy::{Discrepancy, ReconcilePolicy};
use crate::record::Record;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Unix mode given to a newly created collection
#[cfg(unix)]
const NEW_FILE_MODE: u32 = 0o644;

/// Result of reconciling one observation
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    /// The collection was rewritten to disk
    pub written: bool,
    pub action: MergeAction,
    /// Informational only, never blocks the merge
    pub discrepancies: Vec<Discrepancy>,
}

/// Persisted record collection at a fixed path
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
    policy: ReconcilePolicy,
}

impl RecordStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            policy: ReconcilePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReconcilePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sidecar file guarding the read-modify-write cycle
    pub fn lock_path(&self) -> PathBuf {
        let mut name: OsString = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Read the whole collection, `None` if the file does not exist
    pub fn load(&self) -> Result<Option<RecordCollection>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        RecordCollection::from_reader(file).map(Some)
    }

    /// Replace the file with `collection`
    ///
    /// Rows go to a temporary file in the same directory which is synced and
    /// then renamed over the target. On failure the previous file is untouched.
    pub fn save(&self, collection: &RecordCollection) -> Result<()> {
        let dir = self.ensure_parent_dir()?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;
        let permissions = match fs::metadata(&self.path) {
            Ok(metadata) => Some(metadata.permissions()),
            Err(_) => new_file_permissions(),
        };
        if let Some(permissions) = permissions {
            tmp.as_file()
                .set_permissions(permissions)
                .map_err(|e| StoreError::io(tmp.path(), e))?;
        }

        collection.write_to(&mut tmp)?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(&self.path)?;

        debug!("Wrote {} records to {}", collection.len(), self.path.display());
        Ok(())
    }

    /// Load, merge `observation`, and rewrite the collection
    pub fn reconcile(&self, observation: &Record) -> Result<ReconcileOutcome> {
        observation.validate()?;
        self.ensure_parent_dir()?;

        let lock_path = self.lock_path();
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| StoreError::io(&lock_path, e))?;
        let mut lock = fd_lock::RwLock::new(lock_file);
        let _guard = lock.write().map_err(|e| StoreError::io(&lock_path, e))?;

        let (collection, action, discrepancies) = match self.load()? {
            None => {
                info!("No collection at {}, creating it", self.path.display());
                (
                    RecordCollection::with_record(observation.clone()),
                    MergeAction::Created,
                    Vec::new(),
                )
            }
            Some(mut collection) => {
                let (action, discrepancies) = collection.upsert(observation.clone(), &self.policy);
                (collection, action, discrepancies)
            }
        };

        self.save(&collection)?;

        info!(
            "Reconciled {} ({:?}, {} discrepancies, {} records)",
            observation.mac_address,
            action,
            discrepancies.len(),
            collection.len()
        );

        Ok(ReconcileOutcome {
            written: true,
            action,
            discrepancies,
        })
    }

    fn ensure_parent_dir(&self) -> Result<PathBuf> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(dir)
    }
}

/// Permissions for a collection created from scratch
#[cfg(unix)]
fn new_file_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(NEW_FILE_MODE))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<fs::Permissions> {
    None
}

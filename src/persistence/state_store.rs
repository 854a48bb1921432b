//! JSON state file and cross-process cycle lock
//!
//! One invocation runs one cycle, so per-service bookkeeping (failure
//! counts, alert timestamps, remediation windows) lives in a state file
//! between runs. The lock file next to it keeps two cycles from overlapping.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::domain::ServiceState;
use crate::error::{Result, WardenError};

/// On-disk layout of the state file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedStates {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceState>,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

/// Exclusive hold on the cycle lock; released on drop
#[derive(Debug)]
pub struct CycleLock {
    _file: File,
    path: PathBuf,
}

impl CycleLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                WardenError::StateStore(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        Ok(())
    }

    /// Read persisted state. A missing file is an empty state; an unreadable
    /// one is set aside as `<file>.corrupt` and treated as empty.
    pub fn load(&self) -> Result<PersistedStates> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting fresh", self.path.display());
                return Ok(PersistedStates::default());
            }
            Err(e) => {
                return Err(WardenError::StateStore(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        match serde_json::from_str(&contents) {
            Ok(states) => Ok(states),
            Err(e) => {
                let mut backup = self.path.as_os_str().to_owned();
                backup.push(".corrupt");
                warn!(
                    "State file {} is unreadable ({}); moving it to {:?} and starting fresh",
                    self.path.display(),
                    e,
                    backup
                );
                if let Err(e) = fs::rename(&self.path, &backup) {
                    warn!("Failed to set aside corrupt state file: {}", e);
                }
                Ok(PersistedStates::default())
            }
        }
    }

    /// Write state atomically: temp file in the same directory, then rename
    pub fn save(&self, services: &BTreeMap<String, ServiceState>) -> Result<()> {
        self.ensure_parent()?;

        let states = PersistedStates {
            updated_at: Some(Utc::now()),
            services: services.clone(),
        };
        let contents = serde_json::to_string_pretty(&states)?;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        {
            let mut file = File::create(&tmp)
                .with_context(|| format!("failed to write {}", tmp.display()))?;
            file.write_all(contents.as_bytes())
                .with_context(|| format!("failed to write {}", tmp.display()))?;
            file.sync_all()?;
        }

        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        debug!(
            "Saved state for {} services to {}",
            services.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Take the cross-process cycle lock without blocking.
    ///
    /// Fails with `CycleInProgress` if another process holds it.
    pub fn lock(&self) -> Result<CycleLock> {
        self.ensure_parent()?;
        let path = self.lock_path();

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| {
                WardenError::StateStore(format!("failed to open {}: {}", path.display(), e))
            })?;

        try_lock_exclusive(&file)?;
        info!("Acquired cycle lock {}", path.display());

        Ok(CycleLock { _file: file, path })
    }

    /// Take the cycle lock, then read state under it. Reading first would let
    /// a cycle run on bookkeeping that the previous holder is about to
    /// overwrite.
    pub fn lock_and_load(&self) -> Result<(CycleLock, PersistedStates)> {
        let lock = self.lock()?;
        let states = self.load()?;
        Ok((lock, states))
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> Result<()> {
    use nix::errno::Errno;
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(()) => Ok(()),
        Err(Errno::EWOULDBLOCK) => Err(WardenError::CycleInProgress),
        Err(e) => Err(WardenError::StateStore(format!("flock failed: {}", e))),
    }
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> Result<()> {
    // Only the in-process cycle guard applies here
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ServiceStatus, Severity};

    fn store(dir: &tempfile::TempDir) -> StateStore {
        StateStore::new(dir.path().join("nested").join("state.json"))
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let states = store(&dir).load().unwrap();
        assert!(states.services.is_empty());
        assert!(states.updated_at.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let mut api = ServiceState::new();
        api.record_failure(Utc::now());
        api.escalate();
        api.record_alert(Severity::Critical, Utc::now());

        let mut services = BTreeMap::new();
        services.insert("api".to_string(), api.clone());
        store.save(&services).unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.updated_at.is_some());
        assert_eq!(loaded.services["api"], api);
        assert_eq!(loaded.services["api"].status, ServiceStatus::Critical);
        // No temp file left behind
        assert!(!dir.path().join("nested").join("state.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_set_aside() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{ not json").unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.services.is_empty());
        assert!(dir.path().join("nested").join("state.json.corrupt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_second_lock_is_rejected_until_released() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let held = store.lock().unwrap();
        assert!(held.path().ends_with("state.json.lock"));
        assert!(matches!(store.lock(), Err(WardenError::CycleInProgress)));

        drop(held);
        assert!(store.lock().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_lock_and_load_sees_previous_holder_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let now = Utc::now();

        let (first, initial) = store.lock_and_load().unwrap();
        assert!(initial.services.is_empty());

        // A second invocation cannot read state while the first holds the lock
        assert!(matches!(store.lock_and_load(), Err(WardenError::CycleInProgress)));

        let mut api = ServiceState::new();
        api.begin_remediation(now, std::time::Duration::from_secs(60), 2)
            .unwrap();
        let mut services = BTreeMap::new();
        services.insert("api".to_string(), api);
        store.save(&services).unwrap();
        drop(first);

        let (_second, loaded) = store.lock_and_load().unwrap();
        assert_eq!(loaded.services["api"].attempts_in_window, 1);
    }
}

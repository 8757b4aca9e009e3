//! # Storage Module - Checkpoint Persistence
//!
//! The checkpoint store makes the user directory durable across restarts. The
//! whole directory is serialized into a single bincode blob (connection
//! handles excluded, timestamps as ISO-8601 strings via chrono's serde) at a
//! fixed, configurable path. The blob is loaded wholesale at startup and
//! overwritten wholesale on every checkpoint.
//!
//! ## Write Path
//!
//! `save` writes to a sibling `.tmp` file under an exclusive file lock, fsyncs,
//! renames over the destination, then runs [`CheckpointStore::verify`]: the
//! file is read back, deserialized, and every live record's persisted fields
//! are diffed against the re-read copy. Discrepancies are logged, never
//! raised — verification-after-write is a corruption detector, and the
//! checkpoint cadence is coarse enough that the extra full read is cheap.
//!
//! ## Error Handling
//!
//! A missing checkpoint file on load is normal first startup (empty
//! directory), not an error. No persistence error is ever surfaced to clients.

use anyhow::{Context, Result};
use fs2::FileExt;
use log::{info, warn};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::directory::UserRecord;

/// Serializer/deserializer for the user directory blob.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CheckpointStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and deserialize the checkpoint file. An absent file yields an
    /// empty directory.
    pub fn load(&self) -> Result<HashMap<String, UserRecord>> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                let records: HashMap<String, UserRecord> = bincode::deserialize(&bytes)
                    .with_context(|| format!("corrupt checkpoint file {}", self.path.display()))?;
                info!(
                    "Loaded checkpoint from {} ({} users)",
                    self.path.display(),
                    records.len()
                );
                Ok(records)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "No checkpoint file at {}; starting with an empty directory",
                    self.path.display()
                );
                Ok(HashMap::new())
            }
            Err(e) => {
                Err(e).with_context(|| format!("cannot read checkpoint file {}", self.path.display()))
            }
        }
    }

    /// Serialize the snapshot and replace the checkpoint file, then verify the
    /// write by re-reading. Verification problems are logged, not raised.
    pub fn save(&self, snapshot: &HashMap<String, UserRecord>) -> Result<()> {
        let bytes = bincode::serialize(snapshot).context("serialize checkpoint")?;

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)
                .with_context(|| format!("create {}", tmp.display()))?;
            file.lock_exclusive()
                .with_context(|| format!("lock {}", tmp.display()))?;
            file.write_all(&bytes)
                .with_context(|| format!("write {}", tmp.display()))?;
            file.sync_all()
                .with_context(|| format!("sync {}", tmp.display()))?;
            let _ = FileExt::unlock(&file);
        }
        fs::rename(&tmp, &self.path).with_context(|| {
            format!("rename {} -> {}", tmp.display(), self.path.display())
        })?;

        let mismatches = self.verify(snapshot);
        if mismatches == 0 {
            info!(
                "Checkpoint complete: {} users written to {}",
                snapshot.len(),
                self.path.display()
            );
        }
        Ok(())
    }

    /// Re-read the checkpoint file and diff every live record's persisted
    /// fields against the stored copy. Returns the number of discrepancies;
    /// each one is logged.
    pub fn verify(&self, live: &HashMap<String, UserRecord>) -> usize {
        let stored: HashMap<String, UserRecord> = match fs::read(&self.path) {
            Ok(bytes) => match bincode::deserialize(&bytes) {
                Ok(records) => records,
                Err(e) => {
                    warn!("Checkpoint verification failed: cannot deserialize {}: {}", self.path.display(), e);
                    return live.len();
                }
            },
            Err(e) => {
                warn!("Checkpoint verification failed: cannot re-read {}: {}", self.path.display(), e);
                return live.len();
            }
        };

        let mut mismatches = 0;
        for (username, record) in live {
            match stored.get(username) {
                None => {
                    warn!("Checkpoint verification: user `{}` missing from stored blob", username);
                    mismatches += 1;
                }
                Some(copy) if !record.persisted_eq(copy) => {
                    warn!("Checkpoint verification: user `{}` fields do not match stored blob", username);
                    mismatches += 1;
                }
                Some(_) => {}
            }
        }
        mismatches
    }
}

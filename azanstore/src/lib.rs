//! Override store for the azand scheduler
//!
//! A single JSON record on disk (`{"paused": bool, "pause_until": timestamp|null}`)
//! shared between the scheduler daemon and any control-surface process (CLI or
//! web). The scheduler consults [`OverrideStore::is_effectively_paused`] before
//! every playback; control surfaces write through [`OverrideStore::pause`] and
//! [`OverrideStore::resume`].
//!
//! Concurrency: the store is a plain file, not a lock. `is_effectively_paused`
//! does a read-modify-write with no coordination, so an auto-clear racing a
//! manual pause from another process can clobber it (and vice versa). This is a
//! human-triggered, seconds-scale control path and the race is accepted by
//! design. What IS guaranteed is that writes replace the whole record
//! atomically (temp file + rename), so a reader never observes a torn record.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from override store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The persisted override record.
///
/// `pause_until` is only meaningful while `paused` is true. A `paused` record
/// whose window has elapsed means "expired, auto-clears on the next gating
/// check" - readers must not interpret it as running.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideState {
    pub paused: bool,
    pub pause_until: Option<DateTime<Local>>,
}

impl OverrideState {
    /// Whether the pause window (if any) has elapsed at `now`.
    ///
    /// False for indefinite pauses and for unpaused records.
    pub fn expired(&self, now: DateTime<Local>) -> bool {
        self.paused && self.pause_until.is_some_and(|until| now >= until)
    }
}

/// Handle to the override record on disk.
///
/// Opened once at process start and passed explicitly; every operation reads
/// or replaces the whole record.
#[derive(Debug, Clone)]
pub struct OverrideStore {
    path: PathBuf,
}

impl OverrideStore {
    /// Open a store at the given path, creating the parent directory.
    ///
    /// The record file itself is created lazily on first write; a missing
    /// file reads as the default (unpaused) state.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!(?path, "OverrideStore opened");
        Ok(Self { path })
    }

    /// Path of the record file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current record.
    ///
    /// Missing file yields the default state. A corrupt record is logged and
    /// treated as the default state rather than failing the caller.
    pub fn read(&self) -> Result<OverrideState, StoreError> {
        if !self.path.exists() {
            return Ok(OverrideState::default());
        }

        let contents = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&contents) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt override record, treating as unpaused");
                Ok(OverrideState::default())
            }
        }
    }

    /// Atomically replace the record.
    pub fn write(&self, state: &OverrideState) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!(paused = state.paused, pause_until = ?state.pause_until, "Override record written");
        Ok(())
    }

    /// Pause playback, optionally for a bounded number of minutes.
    ///
    /// A new pause overwrites any prior window - pauses never stack or extend.
    /// Returns the written state.
    pub fn pause(
        &self,
        now: DateTime<Local>,
        duration_minutes: Option<i64>,
    ) -> Result<OverrideState, StoreError> {
        let state = OverrideState {
            paused: true,
            pause_until: duration_minutes.map(|m| now + Duration::minutes(m)),
        };
        self.write(&state)?;
        match state.pause_until {
            Some(until) => info!(%until, "Paused until"),
            None => info!("Paused indefinitely"),
        }
        Ok(state)
    }

    /// Resume unconditionally, regardless of any remaining window.
    pub fn resume(&self) -> Result<OverrideState, StoreError> {
        let state = OverrideState::default();
        self.write(&state)?;
        info!("Resumed");
        Ok(state)
    }

    /// The gating predicate the scheduler runs before each playback.
    ///
    /// An elapsed pause window auto-clears here (lazy expiry): the cleared
    /// record is written back and `false` is returned. There is no background
    /// sweep - a stale window persists on disk until the next gating check.
    pub fn is_effectively_paused(&self, now: DateTime<Local>) -> Result<bool, StoreError> {
        let state = self.read()?;

        if !state.paused {
            return Ok(false);
        }

        if state.expired(now) {
            self.write(&OverrideState::default())?;
            info!("Pause window elapsed, auto-resumed");
            return Ok(false);
        }

        Ok(true)
    }
}

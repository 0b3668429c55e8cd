//! Checkpoint format and persistence.
//!
//! A checkpoint lists every task that has not reached a terminal state, in a
//! form that survives a process restart. Monotonic instants are mapped onto
//! wall-clock time through a fixed [`ClockAnchor`], so two snapshots of an
//! unchanged scheduler are identical.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::CheckpointError;
use super::task::{Priority, Task, TaskId, TaskSpec};

pub const CHECKPOINT_VERSION: u32 = 1;

/// One unfinished task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord<P> {
    pub id: TaskId,
    pub payload: P,
    pub priority: Priority,
    /// Attempts completed before the checkpoint was taken.
    pub attempt: u32,
    pub max_attempts: u32,
    pub not_before: DateTime<Utc>,
    pub cost: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    /// The task was mid-attempt. Its attempt is not counted and it will run
    /// again after restore.
    #[serde(default)]
    pub in_flight: bool,
}

impl<P> CheckpointRecord<P> {
    /// Convert back into a submission, mapping wall-clock readiness onto the
    /// current process clock.
    pub fn into_spec(self, anchor: &ClockAnchor) -> TaskSpec<P> {
        let mut spec = TaskSpec::new(self.payload)
            .with_id(self.id)
            .with_priority(self.priority)
            .with_max_attempts(self.max_attempts)
            .with_cost(self.cost)
            .with_attempt(self.attempt)
            .not_before(anchor.to_instant(self.not_before));
        if let Some(ms) = self.timeout_ms {
            spec = spec.with_timeout(Duration::from_millis(ms));
        }
        if let Some(partition) = self.partition {
            spec = spec.with_partition(partition);
        }
        spec
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint<P> {
    pub version: u32,
    pub taken_at: DateTime<Utc>,
    pub records: Vec<CheckpointRecord<P>>,
}

impl<P> Checkpoint<P> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Fixed correspondence between the monotonic clock and wall-clock time.
#[derive(Debug, Clone, Copy)]
pub struct ClockAnchor {
    instant: Instant,
    wall: DateTime<Utc>,
}

impl Default for ClockAnchor {
    fn default() -> Self {
        Self::now()
    }
}

impl ClockAnchor {
    pub fn now() -> Self {
        Self { instant: Instant::now(), wall: Utc::now() }
    }

    pub fn to_wall(&self, at: Instant) -> DateTime<Utc> {
        if at >= self.instant {
            self.wall + to_chrono(at - self.instant)
        } else {
            self.wall - to_chrono(self.instant - at)
        }
    }

    /// Wall-clock times before the anchor map to the anchor instant; the
    /// task is simply due.
    pub fn to_instant(&self, at: DateTime<Utc>) -> Instant {
        match (at - self.wall).to_std() {
            Ok(ahead) => self.instant + ahead,
            Err(_) => self.instant,
        }
    }
}

/// Offsets beyond a century are clamped; no task waits that long.
fn to_chrono(d: Duration) -> chrono::Duration {
    let century = chrono::Duration::days(36_525);
    chrono::Duration::from_std(d).map_or(century, |d| d.min(century))
}

/// Build a record from a live task.
pub(crate) fn record_from_task<P: Clone>(
    task: &Task<P>,
    anchor: &ClockAnchor,
    in_flight: bool,
) -> CheckpointRecord<P> {
    CheckpointRecord {
        id: task.id.clone(),
        payload: (*task.payload).clone(),
        priority: task.priority,
        attempt: task.attempt,
        max_attempts: task.max_attempts,
        not_before: anchor.to_wall(task.not_before),
        cost: task.cost,
        timeout_ms: task.timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
        partition: task.partition.clone(),
        in_flight,
    }
}

/// Durable home for checkpoints.
pub trait CheckpointStore<P>: Send + Sync {
    fn save(&self, checkpoint: &Checkpoint<P>) -> Result<(), CheckpointError>;

    /// Most recent checkpoint, or `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<Checkpoint<P>>, CheckpointError>;
}

impl<P, S> CheckpointStore<P> for Arc<S>
where
    S: CheckpointStore<P> + ?Sized,
{
    fn save(&self, checkpoint: &Checkpoint<P>) -> Result<(), CheckpointError> {
        (**self).save(checkpoint)
    }

    fn load(&self) -> Result<Option<Checkpoint<P>>, CheckpointError> {
        (**self).load()
    }
}

/// JSON file store. Writes go to a temporary file in the same directory and
/// are renamed into place, so a crash never leaves a torn checkpoint.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<P> CheckpointStore<P> for JsonFileStore
where
    P: Serialize + DeserializeOwned + Send + Sync,
{
    fn save(&self, checkpoint: &Checkpoint<P>) -> Result<(), CheckpointError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, checkpoint)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| CheckpointError::Io(e.error))?;

        debug!(path = %self.path.display(), tasks = checkpoint.len(), "checkpoint: saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<Checkpoint<P>>, CheckpointError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let checkpoint: Checkpoint<P> = serde_json::from_slice(&bytes)?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::Unsupported {
                found: checkpoint.version,
                expected: CHECKPOINT_VERSION,
            });
        }
        Ok(Some(checkpoint))
    }
}

/// In-memory store, mostly for tests and embedding.
#[derive(Debug)]
pub struct MemoryStore<P> {
    latest: Mutex<Option<Checkpoint<P>>>,
    saves: Mutex<usize>,
}

impl<P> Default for MemoryStore<P> {
    fn default() -> Self {
        Self { latest: Mutex::new(None), saves: Mutex::new(0) }
    }
}

impl<P> MemoryStore<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl<P> CheckpointStore<P> for MemoryStore<P>
where
    P: Clone + Send + Sync,
{
    fn save(&self, checkpoint: &Checkpoint<P>) -> Result<(), CheckpointError> {
        *self.latest.lock() = Some(checkpoint.clone());
        *self.saves.lock() += 1;
        Ok(())
    }

    fn load(&self) -> Result<Option<Checkpoint<P>>, CheckpointError> {
        Ok(self.latest.lock().clone())
    }
}

//! Progress persistence: a background writer thread and a JSON file backend

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use flume::{Receiver, Sender};
use log::{debug, error};
use serde::{Deserialize, Serialize};

use super::store::{ProgressSink, ProgressSnapshot, ProgressWrite, WriteStamp};

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("stale write for {document_id}: {stamp:?} is not newer than {latest:?}")]
    StaleWrite {
        document_id: String,
        stamp: WriteStamp,
        latest: WriteStamp,
    },

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{detail}")]
    Generic { detail: String },
}

impl PersistError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// Where reading progress is ultimately stored
pub trait ProgressBackend: Send {
    fn update_reading_progress(&mut self, write: &ProgressWrite) -> Result<(), PersistError>;

    /// Stored progress for a document, empty if nothing was recorded
    fn load_snapshot(&self, document_id: &str) -> ProgressSnapshot;
}

#[derive(Debug)]
enum PersistRequest {
    Write(ProgressWrite),
    Shutdown,
}

/// Runs a backend on its own thread so writes never block the caller.
///
/// Dropping the worker drains queued writes and joins the thread.
pub struct PersistWorker {
    tx: Sender<PersistRequest>,
    handle: Option<JoinHandle<()>>,
}

impl PersistWorker {
    pub fn spawn<B: ProgressBackend + 'static>(backend: B) -> Self {
        let (tx, rx) = flume::unbounded();
        let handle = std::thread::spawn(move || persist_worker(backend, rx));
        Self {
            tx,
            handle: Some(handle),
        }
    }

    /// A sink feeding this worker
    #[must_use]
    pub fn handle(&self) -> PersistHandle {
        PersistHandle {
            tx: self.tx.clone(),
        }
    }
}

impl Drop for PersistWorker {
    fn drop(&mut self) {
        let _ = self.tx.send(PersistRequest::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Progress writer thread panicked");
            }
        }
    }
}

fn persist_worker<B: ProgressBackend>(mut backend: B, rx: Receiver<PersistRequest>) {
    while let Ok(request) = rx.recv() {
        match request {
            PersistRequest::Write(write) => match backend.update_reading_progress(&write) {
                Ok(()) => debug!(
                    "Stored progress for {}: {} at {}",
                    write.document_id, write.block_id, write.position
                ),
                Err(e) => error!("Failed to store progress for {}: {e}", write.document_id),
            },
            PersistRequest::Shutdown => break,
        }
    }
}

/// Cloneable sender side of a [`PersistWorker`]
#[derive(Clone)]
pub struct PersistHandle {
    tx: Sender<PersistRequest>,
}

impl ProgressSink for PersistHandle {
    fn persist(&self, write: ProgressWrite) {
        if let Err(e) = self.tx.send(PersistRequest::Write(write)) {
            error!("Progress writer is gone, dropping write: {e}");
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProgress {
    pub block_id: String,
    pub position: usize,
    pub stamp: WriteStamp,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProgressFile {
    documents: HashMap<String, StoredProgress>,
}

/// Per-document progress kept in a single JSON file
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    file: ProgressFile,
}

impl JsonFileBackend {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = if path.exists() {
            let content = fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            ProgressFile::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::load(path).unwrap_or_else(|e| {
            error!("Failed to load progress from {}: {e}", path.display());
            Self {
                path: path.to_path_buf(),
                file: ProgressFile::default(),
            }
        })
    }

    #[must_use]
    pub fn get(&self, document_id: &str) -> Option<&StoredProgress> {
        self.file.documents.get(document_id)
    }

    /// The stored progress in the shape the document loader hands to the store
    #[must_use]
    pub fn snapshot(&self, document_id: &str) -> ProgressSnapshot {
        match self.get(document_id) {
            Some(stored) => ProgressSnapshot {
                furthest_read_block_id: Some(stored.block_id.clone()),
                furthest_read_position: i64::try_from(stored.position).ok(),
                furthest_read_updated_at: Some(stored.updated_at),
            },
            None => ProgressSnapshot::default(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StoredProgress)> {
        self.file.documents.iter()
    }

    fn save(&self) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(&self.file)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

impl ProgressBackend for JsonFileBackend {
    fn update_reading_progress(&mut self, write: &ProgressWrite) -> Result<(), PersistError> {
        if let Some(existing) = self.file.documents.get(&write.document_id) {
            let same_session = existing.stamp.session == write.stamp.session;
            if same_session && write.stamp.sequence <= existing.stamp.sequence {
                return Err(PersistError::StaleWrite {
                    document_id: write.document_id.clone(),
                    stamp: write.stamp,
                    latest: existing.stamp,
                });
            }
        }

        self.file.documents.insert(
            write.document_id.clone(),
            StoredProgress {
                block_id: write.block_id.clone(),
                position: write.position,
                stamp: write.stamp,
                updated_at: Utc::now(),
            },
        );
        self.save()
    }

    fn load_snapshot(&self, document_id: &str) -> ProgressSnapshot {
        self.snapshot(document_id)
    }
}

//! Furthest-read watermark with throttled persistence
//!
//! The watermark only moves forward. Every advance is applied in memory
//! immediately; writes to the backend are limited to one per throttle
//! interval, and a write deferred by the throttle always carries the latest
//! position at the moment it fires.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::blocks::BlockSequence;

/// Current reading watermark for a document
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingProgress {
    pub furthest_block_id: Option<String>,
    pub furthest_position: Option<usize>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Persisted progress as it arrives with the document metadata
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    #[serde(default)]
    pub furthest_read_block_id: Option<String>,
    /// Negative values mean "nothing read yet"
    #[serde(default)]
    pub furthest_read_position: Option<i64>,
    #[serde(default)]
    pub furthest_read_updated_at: Option<DateTime<Utc>>,
}

impl ProgressSnapshot {
    fn position(&self) -> Option<usize> {
        self.furthest_read_position
            .and_then(|p| usize::try_from(p).ok())
    }
}

/// Orders writes from one store so a backend can drop ones that arrive late.
///
/// `session` distinguishes stores (wall-clock millis at creation);
/// `sequence` increases with every write the store issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WriteStamp {
    pub session: i64,
    pub sequence: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressWrite {
    pub document_id: String,
    pub block_id: String,
    pub position: usize,
    pub stamp: WriteStamp,
}

/// Destination for progress writes.
///
/// Fire-and-forget: implementations report their own failures.
pub trait ProgressSink {
    fn persist(&self, write: ProgressWrite);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    UnknownBlock,
    /// Position not beyond the current watermark
    NotAdvanced,
    /// Advanced and written immediately
    Persisted,
    /// Advanced; the write waits in the throttle slot until `until`
    Deferred { until: Instant },
}

#[derive(Clone, Debug)]
struct PendingWrite {
    block_id: String,
    position: usize,
}

pub struct ProgressStore {
    document_id: String,
    state: ReadingProgress,
    initialized: bool,
    throttle: Duration,
    last_persist: Option<Instant>,
    pending: Option<PendingWrite>,
    deadline: Option<Instant>,
    session: i64,
    next_sequence: u64,
    sink: Box<dyn ProgressSink>,
}

impl ProgressStore {
    pub fn new(document_id: impl Into<String>, throttle: Duration, sink: Box<dyn ProgressSink>) -> Self {
        Self {
            document_id: document_id.into(),
            state: ReadingProgress::default(),
            initialized: false,
            throttle,
            last_persist: None,
            pending: None,
            deadline: None,
            session: next_session_id(),
            next_sequence: 1,
            sink,
        }
    }

    #[must_use]
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Seed the watermark from the persisted snapshot. Only the first call counts.
    pub fn initialize(&mut self, snapshot: &ProgressSnapshot) {
        if self.initialized {
            debug!("Progress for {} already initialized", self.document_id);
            return;
        }
        self.initialized = true;

        let Some(position) = snapshot.position() else {
            return;
        };
        if self.state.furthest_position.is_some_and(|cur| cur >= position) {
            return;
        }
        self.state = ReadingProgress {
            furthest_block_id: snapshot.furthest_read_block_id.clone(),
            furthest_position: Some(position),
            last_updated: snapshot.furthest_read_updated_at,
        };
        debug!(
            "Initialized progress for {} at position {position}",
            self.document_id
        );
    }

    /// Record `block_id` as read if it is beyond the current watermark
    pub fn update(&mut self, block_id: &str, blocks: &BlockSequence, now: Instant) -> UpdateOutcome {
        let Some(position) = blocks.position_of(block_id) else {
            warn!(
                "Cannot record progress for {}: block {block_id} not found",
                self.document_id
            );
            return UpdateOutcome::UnknownBlock;
        };

        if self.state.furthest_position.is_some_and(|cur| position <= cur) {
            return UpdateOutcome::NotAdvanced;
        }

        self.state = ReadingProgress {
            furthest_block_id: Some(block_id.to_string()),
            furthest_position: Some(position),
            last_updated: Some(Utc::now()),
        };

        let pending = PendingWrite {
            block_id: block_id.to_string(),
            position,
        };

        match self.last_persist {
            Some(last) if now.saturating_duration_since(last) < self.throttle => {
                let until = last + self.throttle;
                self.pending = Some(pending);
                self.deadline = Some(until);
                UpdateOutcome::Deferred { until }
            }
            _ => {
                // An immediate write supersedes anything waiting in the slot
                self.pending = None;
                self.deadline = None;
                self.write(pending, now);
                UpdateOutcome::Persisted
            }
        }
    }

    /// Fire the deferred write if its time has come. Returns true if a write was issued.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                match self.pending.take() {
                    Some(pending) => {
                        self.write(pending, now);
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub fn has_pending_write(&self) -> bool {
        self.pending.is_some()
    }

    /// Copy of the current watermark
    #[must_use]
    pub fn furthest_progress(&self) -> ReadingProgress {
        self.state.clone()
    }

    fn write(&mut self, pending: PendingWrite, now: Instant) {
        let stamp = WriteStamp {
            session: self.session,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.last_persist = Some(now);
        debug!(
            "Persisting progress for {}: {} at {}",
            self.document_id, pending.block_id, pending.position
        );
        self.sink.persist(ProgressWrite {
            document_id: self.document_id.clone(),
            block_id: pending.block_id,
            position: pending.position,
            stamp,
        });
    }
}

/// Wall-clock millis, bumped so stores created in the same millisecond differ
fn next_session_id() -> i64 {
    static LAST: AtomicI64 = AtomicI64::new(0);
    let now = Utc::now().timestamp_millis();
    let mut last = LAST.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

impl Drop for ProgressStore {
    fn drop(&mut self) {
        if let Some(pending) = &self.pending {
            debug!(
                "Discarding throttled write for {} at position {}",
                self.document_id, pending.position
            );
        }
    }
}

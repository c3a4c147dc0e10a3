//! Reading-progress tracking

mod dwell;
mod gate;
mod persist;
mod session;
mod store;

pub use dwell::{BlockViewInfo, DwellOutcome, DwellState, DwellTracker, IntersectionReport};
pub use gate::PageGate;
pub use persist::{
    JsonFileBackend, PersistError, PersistHandle, PersistWorker, ProgressBackend, StoredProgress,
};
pub use session::ReadingSession;
pub use store::{
    ProgressSink, ProgressSnapshot, ProgressStore, ProgressWrite, ReadingProgress, UpdateOutcome,
    WriteStamp,
};

//! Dwell-time tracking for the selected block
//!
//! Only the block the user selected is observed. While it is sufficiently
//! visible its dwell time accumulates; once the dwell exceeds the estimated
//! reading time the block is confirmed as read. Confirmation can happen when
//! the block scrolls away or during a periodic sweep while it is still on
//! screen, whichever comes first. Both inputs go through one transition
//! function so a dwell session confirms at most once.

use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::blocks::BlockSequence;
use crate::settings::TrackingSettings;
use crate::words::count_words;

use super::gate::PageGate;

/// Visibility of one block as reported by the viewport observer
#[derive(Clone, Debug, PartialEq)]
pub struct IntersectionReport {
    pub block_id: String,
    /// Fraction of the block's area inside the scroll container, 0.0..=1.0
    pub ratio: f32,
}

impl IntersectionReport {
    pub fn new(block_id: impl Into<String>, ratio: f32) -> Self {
        Self {
            block_id: block_id.into(),
            ratio,
        }
    }
}

/// An in-progress dwell measurement
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockViewInfo {
    pub block_id: String,
    pub started_at: Instant,
    pub word_count: usize,
    pub page: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum DwellState {
    #[default]
    NotTracked,
    Viewing(BlockViewInfo),
    /// Confirmed while still visible; further triggers are ignored until
    /// the block leaves the viewport.
    Confirmed,
}

/// What a single input did to the tracker
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DwellOutcome {
    /// Nothing to do: no selection, a different block, or no live measurement
    Idle,
    /// The selected block became visible and a measurement started
    Started,
    /// The selected block became visible but is too far from the last
    /// confirmed position to count
    Gated,
    StillViewing,
    /// Dwell threshold crossed; the block id should be recorded as read
    Confirmed(String),
    /// Visibility lost before the threshold
    Abandoned,
}

enum Signal {
    Visible { page: usize, word_count: usize },
    Hidden,
    Sweep,
}

#[derive(Debug)]
pub struct DwellTracker {
    selected: Option<String>,
    state: DwellState,
    gate: PageGate,
    min_viewing_time: Duration,
    reading_speed_wpm: u32,
    visibility_threshold: f32,
}

impl DwellTracker {
    #[must_use]
    pub fn new(settings: &TrackingSettings) -> Self {
        Self {
            selected: None,
            state: DwellState::NotTracked,
            gate: PageGate::new(settings.max_page_distance),
            min_viewing_time: settings.min_viewing_time(),
            reading_speed_wpm: settings.reading_speed_wpm,
            visibility_threshold: settings.visibility_threshold,
        }
    }

    /// Switch observation to another block (or none).
    ///
    /// Any unconfirmed measurement for the previous block is dropped without
    /// emitting progress.
    pub fn select(&mut self, block_id: Option<&str>) {
        if self.selected.as_deref() == block_id {
            return;
        }
        if let DwellState::Viewing(info) = &self.state {
            debug!("Selection changed, abandoning dwell on {}", info.block_id);
        }
        self.selected = block_id.map(str::to_string);
        self.state = DwellState::NotTracked;
    }

    #[must_use]
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    #[must_use]
    pub fn state(&self) -> &DwellState {
        &self.state
    }

    #[must_use]
    pub fn live_view(&self) -> Option<&BlockViewInfo> {
        match &self.state {
            DwellState::Viewing(info) => Some(info),
            _ => None,
        }
    }

    /// Dwell needed before a block of `word_count` words counts as read
    #[must_use]
    pub fn required_dwell(&self, word_count: usize) -> Duration {
        if self.reading_speed_wpm == 0 {
            return self.min_viewing_time;
        }
        let reading_ms = (word_count as u64 * 60_000).div_ceil(u64::from(self.reading_speed_wpm));
        self.min_viewing_time.max(Duration::from_millis(reading_ms))
    }

    /// Feed an observer report.
    ///
    /// `last_confirmed` is the furthest confirmed reading position, used by
    /// the page gate.
    pub fn on_visibility(
        &mut self,
        report: &IntersectionReport,
        now: Instant,
        blocks: &BlockSequence,
        last_confirmed: Option<usize>,
    ) -> DwellOutcome {
        if self.selected.as_deref() != Some(report.block_id.as_str()) {
            return DwellOutcome::Idle;
        }

        if report.ratio < self.visibility_threshold {
            return self.transition(Signal::Hidden, now);
        }

        let Some(block) = blocks.get(&report.block_id) else {
            warn!("Visible block {} is not in the document", report.block_id);
            return DwellOutcome::Idle;
        };

        if matches!(self.state, DwellState::NotTracked)
            && !self.gate.permits(block.page, last_confirmed, blocks)
        {
            debug!(
                "Block {} on page {} is outside the page gate",
                block.id, block.page
            );
            return DwellOutcome::Gated;
        }

        let signal = Signal::Visible {
            page: block.page,
            word_count: count_words(&block.content),
        };
        self.transition(signal, now)
    }

    /// Periodic check that confirms a long-dwelling block while still visible
    pub fn sweep(&mut self, now: Instant) -> DwellOutcome {
        self.transition(Signal::Sweep, now)
    }

    fn transition(&mut self, signal: Signal, now: Instant) -> DwellOutcome {
        let state = std::mem::take(&mut self.state);
        let (next, outcome) = match (state, signal) {
            (DwellState::NotTracked, Signal::Visible { page, word_count }) => {
                let Some(block_id) = self.selected.clone() else {
                    return DwellOutcome::Idle;
                };
                debug!("Started dwell on {block_id} ({word_count} words, page {page})");
                let info = BlockViewInfo {
                    block_id,
                    started_at: now,
                    word_count,
                    page,
                };
                (DwellState::Viewing(info), DwellOutcome::Started)
            }
            (DwellState::NotTracked, Signal::Hidden | Signal::Sweep) => {
                (DwellState::NotTracked, DwellOutcome::Idle)
            }

            (DwellState::Viewing(info), Signal::Visible { .. }) => {
                (DwellState::Viewing(info), DwellOutcome::StillViewing)
            }
            (DwellState::Viewing(info), Signal::Hidden) => {
                if self.threshold_reached(&info, now) {
                    debug!("Confirmed {} on visibility loss", info.block_id);
                    (DwellState::NotTracked, DwellOutcome::Confirmed(info.block_id))
                } else {
                    debug!("Abandoned dwell on {}", info.block_id);
                    (DwellState::NotTracked, DwellOutcome::Abandoned)
                }
            }
            (DwellState::Viewing(info), Signal::Sweep) => {
                if self.threshold_reached(&info, now) {
                    debug!("Confirmed {} during sweep", info.block_id);
                    (DwellState::Confirmed, DwellOutcome::Confirmed(info.block_id))
                } else {
                    (DwellState::Viewing(info), DwellOutcome::StillViewing)
                }
            }

            (DwellState::Confirmed, Signal::Hidden) => (DwellState::NotTracked, DwellOutcome::Idle),
            (DwellState::Confirmed, Signal::Visible { .. } | Signal::Sweep) => {
                (DwellState::Confirmed, DwellOutcome::Idle)
            }
        };
        self.state = next;
        outcome
    }

    fn threshold_reached(&self, info: &BlockViewInfo, now: Instant) -> bool {
        now.saturating_duration_since(info.started_at) >= self.required_dwell(info.word_count)
    }
}

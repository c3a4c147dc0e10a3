//! Per-document reading session
//!
//! Wires the dwell tracker to the progress store and owns the timers both
//! need. The host event loop calls [`ReadingSession::tick`] whenever
//! [`ReadingSession::next_deadline`] passes.

use std::time::{Duration, Instant};

use log::debug;

use crate::blocks::BlockSequence;
use crate::settings::TrackingSettings;

use super::dwell::{DwellOutcome, DwellTracker, IntersectionReport};
use super::store::{ProgressSink, ProgressSnapshot, ProgressStore, ReadingProgress, UpdateOutcome};

pub struct ReadingSession {
    blocks: BlockSequence,
    tracker: DwellTracker,
    store: ProgressStore,
    sweep_interval: Duration,
    next_sweep: Option<Instant>,
}

impl ReadingSession {
    pub fn new(
        document_id: impl Into<String>,
        blocks: BlockSequence,
        settings: &TrackingSettings,
        sink: Box<dyn ProgressSink>,
    ) -> Self {
        Self {
            blocks,
            tracker: DwellTracker::new(settings),
            store: ProgressStore::new(document_id, settings.persist_throttle(), sink),
            sweep_interval: settings.sweep_interval(),
            next_sweep: None,
        }
    }

    pub fn initialize(&mut self, snapshot: &ProgressSnapshot) {
        self.store.initialize(snapshot);
    }

    /// Observe a different block; an unconfirmed dwell on the previous one is dropped
    pub fn select_block(&mut self, block_id: Option<&str>) {
        self.tracker.select(block_id);
        if self.tracker.live_view().is_none() {
            self.next_sweep = None;
        }
    }

    pub fn on_visibility(&mut self, report: &IntersectionReport, now: Instant) -> DwellOutcome {
        let last_confirmed = self.store.furthest_progress().furthest_position;
        let outcome = self
            .tracker
            .on_visibility(report, now, &self.blocks, last_confirmed);
        self.after_transition(&outcome, now);
        outcome
    }

    /// Run whatever is due: the dwell sweep and the throttled write
    pub fn tick(&mut self, now: Instant) -> DwellOutcome {
        let outcome = match self.next_sweep {
            Some(at) if at <= now => {
                let outcome = self.tracker.sweep(now);
                self.after_transition(&outcome, now);
                outcome
            }
            _ => DwellOutcome::Idle,
        };
        self.store.tick(now);
        outcome
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.next_sweep, self.store.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    #[must_use]
    pub fn furthest_progress(&self) -> ReadingProgress {
        self.store.furthest_progress()
    }

    #[must_use]
    pub fn blocks(&self) -> &BlockSequence {
        &self.blocks
    }

    #[must_use]
    pub fn tracker(&self) -> &DwellTracker {
        &self.tracker
    }

    #[must_use]
    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    fn after_transition(&mut self, outcome: &DwellOutcome, now: Instant) {
        match outcome {
            DwellOutcome::Confirmed(block_id) => {
                let result = self.store.update(block_id, &self.blocks, now);
                if result == UpdateOutcome::NotAdvanced {
                    debug!("Reread of {block_id} does not move progress");
                }
            }
            DwellOutcome::Started if self.next_sweep.is_none() => {
                self.next_sweep = Some(now + self.sweep_interval);
                return;
            }
            DwellOutcome::StillViewing => {
                if self.next_sweep.is_some_and(|at| at <= now) {
                    self.next_sweep = Some(now + self.sweep_interval);
                }
                return;
            }
            _ => {}
        }
        if self.tracker.live_view().is_none() {
            self.next_sweep = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::blocks::Block;
    use crate::progress::store::ProgressWrite;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<ProgressWrite>>>);

    impl ProgressSink for Recorder {
        fn persist(&self, write: ProgressWrite) {
            self.0.lock().unwrap().push(write);
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn session_with(settings: &TrackingSettings) -> (ReadingSession, Recorder) {
        let blocks: BlockSequence = (0..12)
            .map(|i| Block::new(format!("b{i}"), i / 2, "<p>short paragraph</p>"))
            .collect();
        let rec = Recorder::default();
        let session = ReadingSession::new("doc", blocks, settings, Box::new(rec.clone()));
        (session, rec)
    }

    fn session() -> (ReadingSession, Recorder) {
        session_with(&TrackingSettings::default())
    }

    #[test]
    fn zero_sweep_interval_still_advances() {
        let (mut s, _) = session_with(&TrackingSettings {
            sweep_interval_ms: 0,
            ..TrackingSettings::default()
        });
        let t0 = Instant::now();
        s.select_block(Some("b0"));
        s.on_visibility(&IntersectionReport::new("b0", 1.0), t0);

        let mut ticks = 0;
        let outcome = loop {
            let deadline = s.next_deadline().expect("sweep armed while viewing");
            let outcome = s.tick(deadline);
            ticks += 1;
            if outcome != DwellOutcome::StillViewing {
                break outcome;
            }
            assert!(s.next_deadline() > Some(deadline));
        };
        assert_eq!(outcome, DwellOutcome::Confirmed("b0".into()));
        assert_eq!(ticks, 4000);
    }

    #[test]
    fn sweep_deadline_follows_live_dwell() {
        let (mut s, _) = session();
        let t0 = Instant::now();
        assert_eq!(s.next_deadline(), None);

        s.select_block(Some("b0"));
        s.on_visibility(&IntersectionReport::new("b0", 1.0), t0);
        assert_eq!(s.next_deadline(), Some(t0 + ms(2000)));

        assert_eq!(s.tick(t0 + ms(2000)), DwellOutcome::StillViewing);
        assert_eq!(s.next_deadline(), Some(t0 + ms(4000)));

        assert_eq!(s.tick(t0 + ms(4000)), DwellOutcome::Confirmed("b0".into()));
        assert_eq!(s.furthest_progress().furthest_position, Some(0));
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn tick_before_deadline_does_nothing() {
        let (mut s, _) = session();
        let t0 = Instant::now();
        s.select_block(Some("b0"));
        s.on_visibility(&IntersectionReport::new("b0", 1.0), t0);
        assert_eq!(s.tick(t0 + ms(1999)), DwellOutcome::Idle);
        assert!(s.tracker().live_view().is_some());
    }

    #[test]
    fn confirmations_flow_through_throttle() {
        let (mut s, rec) = session();
        let t0 = Instant::now();

        for (i, id) in ["b0", "b1", "b2"].into_iter().enumerate() {
            let start = t0 + ms(i as u64 * 5000);
            s.select_block(Some(id));
            s.on_visibility(&IntersectionReport::new(id, 1.0), start);
            s.on_visibility(&IntersectionReport::new(id, 0.0), start + ms(4500));
        }
        // b0 at 4500 written, b1 at 9500 written (5000 apart), b2 at 14500 written
        assert_eq!(rec.0.lock().unwrap().len(), 3);
        assert_eq!(s.furthest_progress().furthest_position, Some(2));
    }

    #[test]
    fn pending_write_sets_deadline() {
        let settings = TrackingSettings {
            min_viewing_time_ms: 1000,
            ..TrackingSettings::default()
        };
        let (mut s, rec) = session_with(&settings);
        let t0 = Instant::now();

        s.select_block(Some("b0"));
        s.on_visibility(&IntersectionReport::new("b0", 1.0), t0);
        s.on_visibility(&IntersectionReport::new("b0", 0.0), t0 + ms(1000));

        s.select_block(Some("b1"));
        s.on_visibility(&IntersectionReport::new("b1", 1.0), t0 + ms(1100));
        s.on_visibility(&IntersectionReport::new("b1", 0.0), t0 + ms(2200));

        assert_eq!(rec.0.lock().unwrap().len(), 1);
        assert_eq!(s.furthest_progress().furthest_position, Some(1));
        assert_eq!(s.next_deadline(), Some(t0 + ms(4000)));
        s.tick(t0 + ms(4000));
        assert_eq!(rec.0.lock().unwrap().len(), 2);
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn selection_change_clears_sweep() {
        let (mut s, rec) = session();
        let t0 = Instant::now();
        s.select_block(Some("b0"));
        s.on_visibility(&IntersectionReport::new("b0", 1.0), t0);
        s.select_block(Some("b1"));
        assert_eq!(s.next_deadline(), None);
        assert_eq!(s.tick(t0 + ms(60_000)), DwellOutcome::Idle);
        assert!(rec.0.lock().unwrap().is_empty());
    }
}

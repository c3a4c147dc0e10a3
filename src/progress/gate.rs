//! Plausibility check for a newly visible block

use crate::blocks::BlockSequence;

/// Rejects blocks that are too far from the furthest confirmed position
/// to plausibly be the one being read.
///
/// Backward jumps within the distance are allowed so rereading still counts;
/// only the confirmed-progress accounting is affected, never display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageGate {
    pub max_page_distance: usize,
}

impl Default for PageGate {
    fn default() -> Self {
        Self {
            max_page_distance: 2,
        }
    }
}

impl PageGate {
    #[must_use]
    pub fn new(max_page_distance: usize) -> Self {
        Self { max_page_distance }
    }

    /// Whether a block on `candidate_page` may start a dwell measurement.
    ///
    /// With no confirmed position, or one that no longer resolves to a block,
    /// every candidate is permitted.
    #[must_use]
    pub fn permits(
        &self,
        candidate_page: usize,
        last_confirmed: Option<usize>,
        blocks: &BlockSequence,
    ) -> bool {
        let Some(last_page) = last_confirmed.and_then(|pos| blocks.page_at(pos)) else {
            return true;
        };
        candidate_page.abs_diff(last_page) <= self.max_page_distance
    }
}

//! Per-page heights with fast cumulative offsets
//!
//! A Fenwick tree over page heights in unscaled page units. Replacing one
//! page's estimate with its measured height is O(log n), as are the offset
//! of a page and the page at an offset, so documents with thousands of pages
//! do not recompute every offset on each measurement.

#[derive(Clone, Debug)]
pub struct HeightIndex {
    heights: Vec<f64>,
    measured: Vec<bool>,
    tree: Vec<f64>,
}

impl HeightIndex {
    /// `count` pages, each estimated at `default_height`
    #[must_use]
    pub fn new(count: usize, default_height: f64) -> Self {
        let default_height = default_height.max(0.0);
        let heights = vec![default_height; count];
        let mut tree = vec![0.0; count + 1];
        // Linear-time build
        for i in 1..=count {
            tree[i] += heights[i - 1];
            let parent = i + lowest_bit(i);
            if parent <= count {
                tree[parent] += tree[i];
            }
        }
        Self {
            heights,
            measured: vec![false; count],
            tree,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heights.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    #[must_use]
    pub fn height(&self, page: usize) -> Option<f64> {
        self.heights.get(page).copied()
    }

    #[must_use]
    pub fn is_measured(&self, page: usize) -> bool {
        self.measured.get(page).copied().unwrap_or(false)
    }

    /// Record the real height of a page. Returns the change in height.
    pub fn set_measured(&mut self, page: usize, height: f64) -> f64 {
        if page >= self.heights.len() {
            return 0.0;
        }
        self.measured[page] = true;
        let delta = height.max(0.0) - self.heights[page];
        if delta != 0.0 {
            self.heights[page] += delta;
            let mut i = page + 1;
            while i < self.tree.len() {
                self.tree[i] += delta;
                i += lowest_bit(i);
            }
        }
        delta
    }

    /// Top edge of `page`: the sum of all heights before it
    #[must_use]
    pub fn offset_of(&self, page: usize) -> f64 {
        let mut i = page.min(self.heights.len());
        let mut sum = 0.0;
        while i > 0 {
            sum += self.tree[i];
            i -= lowest_bit(i);
        }
        sum
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.offset_of(self.heights.len())
    }

    /// Page whose span contains `offset`, clamped to the document
    #[must_use]
    pub fn page_at(&self, offset: f64) -> usize {
        self.clamp(self.count_starting_at_or_before(offset, false))
    }

    /// Last page whose top edge is strictly before `offset`
    #[must_use]
    pub fn last_page_before(&self, offset: f64) -> usize {
        self.clamp(self.count_starting_at_or_before(offset, true))
    }

    fn clamp(&self, k: usize) -> usize {
        k.min(self.heights.len().saturating_sub(1))
    }

    /// Largest k such that the sum of the first k heights is <= offset
    /// (or < offset when `strict`).
    fn count_starting_at_or_before(&self, offset: f64, strict: bool) -> usize {
        let n = self.heights.len();
        let mut pos = 0;
        let mut remaining = offset;
        let mut step = n.checked_next_power_of_two().unwrap_or(0);
        if step > n {
            step /= 2;
        }
        while step > 0 {
            let next = pos + step;
            if next <= n {
                let fits = if strict {
                    self.tree[next] < remaining
                } else {
                    self.tree[next] <= remaining
                };
                if fits {
                    pos = next;
                    remaining -= self.tree[next];
                }
            }
            step /= 2;
        }
        pos
    }
}

fn lowest_bit(i: usize) -> usize {
    i & i.wrapping_neg()
}

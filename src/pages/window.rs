//! Virtualized page window
//!
//! Decides which pages of a long document are mounted for a given scroll
//! position. Only the visible pages plus an overscan margin on each side are
//! mounted; everything else is unmounted but keeps its height estimate and
//! its entry in the page memory.
//!
//! Heights are tracked in unscaled page units and multiplied by the zoom to
//! get pixels. Scroll offsets and viewport sizes are in pixels.

use std::ops::RangeInclusive;

use log::{debug, warn};

use crate::settings::WindowSettings;

use super::heights::HeightIndex;
use super::memory::SharedPageMemory;

const MIN_ZOOM: f64 = 0.1;
/// Slack, in page units, for offsets that went through a zoom multiply and divide
const EDGE_TOLERANCE: f64 = 1e-6;

/// Size of a page at zoom 1.0
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// What a page currently shows
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PageSlot {
    #[default]
    Unmounted,
    /// First render in progress, shown as a placeholder
    Loading,
    /// Rendered before and rendering again without a placeholder
    Reloading,
    Ready,
    /// Rendering failed; only this page shows an error
    Failed(String),
}

/// Commands that modify the window
#[derive(Clone, Debug, PartialEq)]
pub enum WindowCommand {
    SetViewport { height: f64 },
    /// The user scrolled to this pixel offset
    ScrollTo(f64),
    SetZoom(f64),
    SetPageCount(usize),
    /// Jump so the top of this 1-based page is at the top of the viewport
    ScrollToPage(usize),
    /// The renderer finished a page
    PageRendered {
        page: usize,
        result: Result<PageSize, String>,
    },
}

/// Effects produced by window changes
#[derive(Clone, Debug, PartialEq)]
pub enum WindowEffect {
    /// Create the page's element. `placeholder` is false for pages that
    /// rendered before, which should not flash a loading state.
    Mount { page: usize, placeholder: bool },
    Unmount(usize),
    RenderPage { page: usize, scale: f64 },
    /// Move the scroll container to this pixel offset
    AdjustScroll(f64),
    /// The 1-based page at the middle of the visible range changed
    PageChanged(usize),
    PageFailed { page: usize, message: String },
}

pub struct PageWindow {
    document_id: String,
    memory: SharedPageMemory,
    heights: HeightIndex,
    default_height: f64,
    zoom: f64,
    scroll_offset: f64,
    viewport_height: f64,
    overscan: usize,
    mounted: Option<RangeInclusive<usize>>,
    slots: Vec<PageSlot>,
    current_page: Option<usize>,
}

impl PageWindow {
    #[must_use]
    pub fn new(
        document_id: impl Into<String>,
        page_count: usize,
        settings: &WindowSettings,
        memory: SharedPageMemory,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            memory,
            heights: HeightIndex::new(page_count, settings.standard_page_height),
            default_height: settings.standard_page_height,
            zoom: 1.0,
            scroll_offset: 0.0,
            viewport_height: 0.0,
            overscan: settings.overscan,
            mounted: None,
            slots: vec![PageSlot::Unmounted; page_count],
            current_page: None,
        }
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: WindowCommand) -> Vec<WindowEffect> {
        let mut effects = Vec::new();
        match cmd {
            WindowCommand::SetViewport { height } => {
                let height = height.max(0.0);
                if (self.viewport_height - height).abs() > f64::EPSILON {
                    self.viewport_height = height;
                    self.recompute(&mut effects);
                }
            }

            WindowCommand::ScrollTo(offset) => {
                self.scroll_offset = offset.max(0.0);
                self.recompute(&mut effects);
            }

            WindowCommand::SetZoom(zoom) => {
                let zoom = zoom.max(MIN_ZOOM);
                if (self.zoom - zoom).abs() > f64::EPSILON {
                    let previously_mounted = self.mounted.clone();
                    self.scroll_offset *= zoom / self.zoom;
                    self.zoom = zoom;
                    effects.push(WindowEffect::AdjustScroll(self.scroll_offset));
                    self.recompute(&mut effects);

                    // Pages that stayed mounted need content at the new scale
                    if let (Some(before), Some(after)) = (previously_mounted, self.mounted.clone()) {
                        for page in after.filter(|p| before.contains(p)) {
                            effects.push(WindowEffect::RenderPage { page, scale: zoom });
                        }
                    }
                }
            }

            WindowCommand::SetPageCount(count) => {
                if count != self.heights.len() {
                    if let Some(range) = self.mounted.take() {
                        effects.extend(range.map(WindowEffect::Unmount));
                    }
                    self.heights = HeightIndex::new(count, self.default_height);
                    self.slots = vec![PageSlot::Unmounted; count];
                    self.current_page = None;
                    self.recompute(&mut effects);
                }
            }

            WindowCommand::ScrollToPage(number) => {
                if number == 0 || number > self.page_count() {
                    debug!(
                        "Ignoring jump to page {number} of {} in {}",
                        self.page_count(),
                        self.document_id
                    );
                } else {
                    self.scroll_offset = self.heights.offset_of(number - 1) * self.zoom;
                    effects.push(WindowEffect::AdjustScroll(self.scroll_offset));
                    self.recompute(&mut effects);
                }
            }

            WindowCommand::PageRendered { page, result } => {
                self.page_rendered(page, result, &mut effects);
            }
        }
        effects
    }

    fn page_rendered(
        &mut self,
        page: usize,
        result: Result<PageSize, String>,
        effects: &mut Vec<WindowEffect>,
    ) {
        if page >= self.page_count() {
            warn!("Render result for page {page} outside {}", self.document_id);
            return;
        }
        let is_mounted = self.is_mounted(page);

        match result {
            Ok(size) => {
                self.memory.mark_as_loaded(&self.document_id, page);
                if is_mounted {
                    self.slots[page] = PageSlot::Ready;
                }

                let top_page = self.top_page();
                let delta = self.heights.set_measured(page, size.height);
                if delta != 0.0 {
                    // Keep the content under the viewport top still when a
                    // page above it changes height
                    if page < top_page {
                        self.scroll_offset = (self.scroll_offset + delta * self.zoom).max(0.0);
                        effects.push(WindowEffect::AdjustScroll(self.scroll_offset));
                    }
                    self.recompute(effects);
                }
            }
            Err(message) => {
                warn!("Page {page} of {} failed to render: {message}", self.document_id);
                if is_mounted {
                    self.slots[page] = PageSlot::Failed(message.clone());
                    effects.push(WindowEffect::PageFailed { page, message });
                }
            }
        }
    }

    fn recompute(&mut self, effects: &mut Vec<WindowEffect>) {
        let Some((start, stop)) = self.visible_range() else {
            if let Some(range) = self.mounted.take() {
                for page in range {
                    self.slots[page] = PageSlot::Unmounted;
                    effects.push(WindowEffect::Unmount(page));
                }
            }
            return;
        };

        let last = self.page_count() - 1;
        let next = start.saturating_sub(self.overscan)..=(stop + self.overscan).min(last);
        let previous = self.mounted.replace(next.clone());

        if let Some(previous) = &previous {
            for page in previous.clone().filter(|p| !next.contains(p)) {
                self.slots[page] = PageSlot::Unmounted;
                effects.push(WindowEffect::Unmount(page));
            }
        }

        for page in next.clone() {
            if previous.as_ref().is_some_and(|r| r.contains(&page)) {
                continue;
            }
            let placeholder = !self.memory.has_ever_loaded(&self.document_id, page);
            self.slots[page] = if placeholder {
                PageSlot::Loading
            } else {
                PageSlot::Reloading
            };
            effects.push(WindowEffect::Mount { page, placeholder });
            effects.push(WindowEffect::RenderPage {
                page,
                scale: self.zoom,
            });
        }

        let current = (start + stop) / 2 + 1;
        if self.current_page != Some(current) {
            self.current_page = Some(current);
            effects.push(WindowEffect::PageChanged(current));
        }
    }

    /// First and last page intersecting the viewport
    fn visible_range(&self) -> Option<(usize, usize)> {
        if self.heights.is_empty() || self.viewport_height <= 0.0 {
            return None;
        }
        let bottom = (self.scroll_offset + self.viewport_height) / self.zoom;
        let start = self.top_page();
        let stop = self
            .heights
            .last_page_before(bottom - EDGE_TOLERANCE)
            .max(start);
        Some((start, stop))
    }

    fn top_page(&self) -> usize {
        self.heights
            .page_at(self.scroll_offset / self.zoom + EDGE_TOLERANCE)
    }

    #[must_use]
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.heights.len()
    }

    #[must_use]
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    #[must_use]
    pub fn scroll_offset(&self) -> f64 {
        self.scroll_offset
    }

    #[must_use]
    pub fn mounted(&self) -> Option<RangeInclusive<usize>> {
        self.mounted.clone()
    }

    #[must_use]
    pub fn is_mounted(&self, page: usize) -> bool {
        self.mounted.as_ref().is_some_and(|r| r.contains(&page))
    }

    #[must_use]
    pub fn slot(&self, page: usize) -> Option<&PageSlot> {
        self.slots.get(page)
    }

    /// 1-based page last reported through [`WindowEffect::PageChanged`]
    #[must_use]
    pub fn current_page(&self) -> Option<usize> {
        self.current_page
    }

    /// Top edge of a page in pixels
    #[must_use]
    pub fn page_top(&self, page: usize) -> f64 {
        self.heights.offset_of(page) * self.zoom
    }

    /// Height of a page in pixels (estimated until rendered)
    #[must_use]
    pub fn page_height(&self, page: usize) -> Option<f64> {
        self.heights.height(page).map(|h| h * self.zoom)
    }

    /// Height of the whole document in pixels
    #[must_use]
    pub fn total_height(&self) -> f64 {
        self.heights.total() * self.zoom
    }
}

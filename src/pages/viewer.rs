//! Document viewer: a page window driven by a render host
//!
//! The window decides what should be mounted, the host renders it. Render
//! effects are consumed here; everything the embedding UI must act on
//! (mounts, unmounts, scroll adjustments, page changes, failures) is
//! returned to the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::settings::WindowSettings;

use super::host::RenderHost;
use super::memory::SharedPageMemory;
use super::request::{PageRasterizer, RenderResponse, RenderedPage};
use super::window::{PageSize, PageWindow, WindowCommand, WindowEffect};

pub struct DocumentViewer {
    window: PageWindow,
    host: RenderHost,
    content: HashMap<usize, Arc<RenderedPage>>,
}

impl DocumentViewer {
    pub fn new<F>(
        document_id: impl Into<String>,
        page_count: usize,
        settings: &WindowSettings,
        memory: SharedPageMemory,
        factory: F,
    ) -> Self
    where
        F: FnMut() -> Box<dyn PageRasterizer>,
    {
        Self {
            window: PageWindow::new(document_id, page_count, settings, memory),
            host: RenderHost::new(settings, factory),
            content: HashMap::new(),
        }
    }

    /// Apply a window command, dispatching render work
    pub fn apply(&mut self, cmd: WindowCommand) -> Vec<WindowEffect> {
        let effects = self.window.apply(cmd);
        self.execute_effects(effects)
    }

    /// Jump to a 1-based page number
    pub fn scroll_to_page(&mut self, number: usize) -> Vec<WindowEffect> {
        self.apply(WindowCommand::ScrollToPage(number))
    }

    /// Feed finished renders into the window without blocking
    pub fn poll_renders(&mut self) -> Vec<WindowEffect> {
        let responses = self.host.poll();
        self.handle_responses(responses)
    }

    /// Wait up to `timeout` for at least one render to finish
    pub fn wait_renders(&mut self, timeout: Duration) -> Vec<WindowEffect> {
        let responses = self.host.wait(timeout);
        self.handle_responses(responses)
    }

    #[must_use]
    pub fn has_pending_renders(&self) -> bool {
        self.host.has_pending()
    }

    /// Rendered content of a mounted page
    #[must_use]
    pub fn content(&self, page: usize) -> Option<Arc<RenderedPage>> {
        self.content.get(&page).cloned()
    }

    #[must_use]
    pub fn window(&self) -> &PageWindow {
        &self.window
    }

    fn handle_responses(&mut self, responses: Vec<RenderResponse>) -> Vec<WindowEffect> {
        let mut out = Vec::new();
        for response in responses {
            let (page, result) = match response {
                RenderResponse::Page { page, data, .. } => {
                    let size = PageSize {
                        width: data.natural_width(),
                        height: data.natural_height(),
                    };
                    if self.window.is_mounted(page) {
                        self.content.insert(page, data);
                    }
                    (page, Ok(size))
                }
                RenderResponse::Error { page, error, .. } => (page, Err(error.to_string())),
                RenderResponse::Cancelled { .. } => continue,
            };
            let effects = self.window.apply(WindowCommand::PageRendered { page, result });
            out.extend(self.execute_effects(effects));
        }
        out
    }

    fn execute_effects(&mut self, effects: Vec<WindowEffect>) -> Vec<WindowEffect> {
        let mut forwarded = Vec::with_capacity(effects.len());
        for effect in effects {
            match effect {
                WindowEffect::RenderPage { page, scale } => {
                    if self.host.request(page, scale).is_none() {
                        debug!("Render of page {page} at {scale} already in flight");
                    }
                }
                WindowEffect::Unmount(page) => {
                    self.host.cancel(page);
                    self.content.remove(&page);
                    forwarded.push(effect);
                }
                WindowEffect::PageFailed { page, .. } => {
                    self.content.remove(&page);
                    forwarded.push(effect);
                }
                other => forwarded.push(other),
            }
        }
        forwarded
    }
}

//! Render request and response types

use std::sync::Arc;

/// Unique identifier for render requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// A rendered page as produced by the PDF library.
///
/// `content` is opaque to this crate; the embedding UI knows how to draw it.
#[derive(Clone)]
pub struct RenderedPage {
    /// Page index (0-indexed)
    pub page: usize,
    /// Scale the page was rendered at
    pub scale: f32,
    /// Rendered width in pixels
    pub width_px: f32,
    /// Rendered height in pixels
    pub height_px: f32,
    pub content: Vec<u8>,
}

impl RenderedPage {
    /// Height at scale 1.0
    #[must_use]
    pub fn natural_height(&self) -> f64 {
        if self.scale > 0.0 {
            f64::from(self.height_px) / f64::from(self.scale)
        } else {
            f64::from(self.height_px)
        }
    }

    /// Width at scale 1.0
    #[must_use]
    pub fn natural_width(&self) -> f64 {
        if self.scale > 0.0 {
            f64::from(self.width_px) / f64::from(self.scale)
        } else {
            f64::from(self.width_px)
        }
    }
}

impl std::fmt::Debug for RenderedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedPage")
            .field("page", &self.page)
            .field("scale", &self.scale)
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .field("content_len", &self.content.len())
            .finish()
    }
}

/// Errors from the PDF library while rendering a page
#[derive(Clone, Debug, thiserror::Error)]
pub enum RenderFault {
    #[error("page {page} is out of range")]
    OutOfRange { page: usize },

    #[error("{detail}")]
    Generic { detail: String },
}

impl RenderFault {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// The external page rendering primitive.
///
/// Each render worker owns one instance.
pub trait PageRasterizer: Send {
    fn rasterize(&mut self, page: usize, scale: f32) -> Result<RenderedPage, RenderFault>;
}

/// Request sent to render workers
#[derive(Debug)]
pub enum RenderRequest {
    Page {
        id: RequestId,
        page: usize,
        scale: f32,
    },

    /// Shutdown the worker
    Shutdown,
}

/// Response from render workers
#[derive(Debug)]
pub enum RenderResponse {
    Page {
        id: RequestId,
        page: usize,
        data: Arc<RenderedPage>,
    },

    Error {
        id: RequestId,
        page: usize,
        error: RenderFault,
    },

    /// The page left the window before a worker picked the request up
    Cancelled { id: RequestId, page: usize },
}

impl RenderResponse {
    #[must_use]
    pub fn id(&self) -> RequestId {
        match self {
            Self::Page { id, .. } | Self::Error { id, .. } | Self::Cancelled { id, .. } => *id,
        }
    }

    #[must_use]
    pub fn page(&self) -> usize {
        match self {
            Self::Page { page, .. } | Self::Error { page, .. } | Self::Cancelled { page, .. } => *page,
        }
    }
}

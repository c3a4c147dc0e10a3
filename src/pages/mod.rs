//! Virtualized page rendering for long documents

mod cache;
mod heights;
mod host;
mod memory;
mod request;
mod viewer;
mod window;
mod worker;

pub use cache::{CacheKey, PageCache};
pub use heights::HeightIndex;
pub use host::RenderHost;
pub use memory::{PageLoadMemory, SharedPageMemory, global as global_page_memory};
pub use request::{
    PageRasterizer, RenderFault, RenderRequest, RenderResponse, RenderedPage, RequestId,
};
pub use viewer::DocumentViewer;
pub use window::{PageSize, PageSlot, PageWindow, WindowCommand, WindowEffect};

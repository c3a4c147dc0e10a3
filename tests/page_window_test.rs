use std::time::Duration;

use folio::pages::{
    DocumentViewer, PageRasterizer, PageSlot, PageWindow, RenderFault, RenderedPage,
    SharedPageMemory, WindowCommand, WindowEffect, global_page_memory,
};
use folio::settings::WindowSettings;
use serial_test::serial;

/// Letter-size pages, except page 7 which is twice as tall and page 9 which is broken
struct FakePdf;

impl PageRasterizer for FakePdf {
    fn rasterize(&mut self, page: usize, scale: f32) -> Result<RenderedPage, RenderFault> {
        if page == 9 {
            return Err(RenderFault::generic("damaged content stream"));
        }
        let height = if page == 7 { 2200.0 } else { 1100.0 };
        Ok(RenderedPage {
            page,
            scale,
            width_px: 850.0 * scale,
            height_px: height * scale,
            content: vec![0; 4],
        })
    }
}

fn settings() -> WindowSettings {
    WindowSettings {
        overscan: 2,
        standard_page_height: 1100.0,
        render_workers: 2,
        content_cache_size: 32,
    }
}

fn settle(viewer: &mut DocumentViewer) -> Vec<WindowEffect> {
    let mut effects = Vec::new();
    while viewer.has_pending_renders() {
        effects.extend(viewer.wait_renders(Duration::from_secs(5)));
    }
    effects
}

#[test]
fn large_document_mounts_only_a_window() {
    let mut window = PageWindow::new("big", 5000, &settings(), SharedPageMemory::isolated());
    let _ = window.apply(WindowCommand::SetViewport { height: 2200.0 });
    let effects = window.apply(WindowCommand::ScrollTo(1100.0 * 2500.0));

    assert_eq!(window.mounted(), Some(2498..=2503));
    let mounts = effects
        .iter()
        .filter(|e| matches!(e, WindowEffect::Mount { .. }))
        .count();
    assert_eq!(mounts, 6);
    assert_eq!(window.total_height(), 1100.0 * 5000.0);
}

#[test]
fn viewer_measures_pages_and_isolates_failures() {
    let mut viewer = DocumentViewer::new(
        "report",
        20,
        &settings(),
        SharedPageMemory::isolated(),
        || Box::new(FakePdf),
    );
    let _ = viewer.apply(WindowCommand::SetViewport { height: 2200.0 });
    let _ = viewer.scroll_to_page(9);
    let effects = settle(&mut viewer);

    assert!(effects.contains(&WindowEffect::PageFailed {
        page: 9,
        message: "damaged content stream".into()
    }));
    assert!(matches!(viewer.window().slot(9), Some(PageSlot::Failed(_))));
    assert_eq!(viewer.window().slot(8), Some(&PageSlot::Ready));
    assert_eq!(viewer.window().page_height(7), Some(2200.0));
    assert!(viewer.content(8).is_some());
    assert!(viewer.content(9).is_none());
}

#[test]
fn taller_page_above_keeps_reading_position() {
    let mut viewer = DocumentViewer::new(
        "report",
        20,
        &settings(),
        SharedPageMemory::isolated(),
        || Box::new(FakePdf),
    );
    let _ = viewer.apply(WindowCommand::SetViewport { height: 1100.0 });
    let _ = viewer.scroll_to_page(9);
    assert_eq!(viewer.window().scroll_offset(), 8.0 * 1100.0);

    let effects = settle(&mut viewer);
    // Page 7 grew by one standard height while sitting above the viewport
    assert!(effects.contains(&WindowEffect::AdjustScroll(9.0 * 1100.0)));
    assert_eq!(viewer.window().scroll_offset(), viewer.window().page_top(8));
}

#[test]
fn zoom_rerenders_at_new_scale() {
    let mut viewer = DocumentViewer::new(
        "report",
        20,
        &settings(),
        SharedPageMemory::isolated(),
        || Box::new(FakePdf),
    );
    let _ = viewer.apply(WindowCommand::SetViewport { height: 1100.0 });
    settle(&mut viewer);

    let _ = viewer.apply(WindowCommand::SetZoom(2.0));
    settle(&mut viewer);
    let content = viewer.content(0).expect("page 0 mounted");
    assert_eq!(content.scale, 2.0);
    assert_eq!(viewer.window().page_height(0), Some(2200.0));
}

#[test]
#[serial]
fn reopened_document_mounts_without_placeholders() {
    let memory = global_page_memory();
    {
        let mut viewer =
            DocumentViewer::new("shared-doc", 10, &settings(), memory.clone(), || {
                Box::new(FakePdf)
            });
        let _ = viewer.apply(WindowCommand::SetViewport { height: 1100.0 });
        settle(&mut viewer);
    }

    let mut window = PageWindow::new("shared-doc", 10, &settings(), memory);
    let effects = window.apply(WindowCommand::SetViewport { height: 1100.0 });
    assert!(effects.contains(&WindowEffect::Mount {
        page: 0,
        placeholder: false
    }));
}

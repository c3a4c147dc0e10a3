//! Page render worker - runs in separate thread(s)

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use flume::{Receiver, Sender};
use log::{debug, trace};

use super::cache::{CacheKey, PageCache};
use super::request::{PageRasterizer, RenderRequest, RenderResponse, RequestId};

/// Request ids the host no longer wants
pub type CancelSet = Arc<Mutex<HashSet<RequestId>>>;

pub fn render_worker(
    mut rasterizer: Box<dyn PageRasterizer>,
    requests: Receiver<RenderRequest>,
    responses: Sender<RenderResponse>,
    cache: Arc<Mutex<PageCache>>,
    cancelled: CancelSet,
) {
    for request in requests {
        match request {
            RenderRequest::Page { id, page, scale } => {
                let response =
                    handle_page_request(rasterizer.as_mut(), id, page, scale, &cache, &cancelled);
                if responses.send(response).is_err() {
                    break;
                }
            }

            RenderRequest::Shutdown => break,
        }
    }
    debug!("Render worker exiting");
}

fn handle_page_request(
    rasterizer: &mut dyn PageRasterizer,
    id: RequestId,
    page: usize,
    scale: f32,
    cache: &Arc<Mutex<PageCache>>,
    cancelled: &CancelSet,
) -> RenderResponse {
    if cancelled
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(&id)
    {
        trace!("Skipping cancelled render of page {page}");
        return RenderResponse::Cancelled { id, page };
    }

    let key = CacheKey::new(page, scale);
    let cached = cache.lock().unwrap_or_else(PoisonError::into_inner).get(&key);
    if let Some(data) = cached {
        return RenderResponse::Page { id, page, data };
    }

    match rasterizer.rasterize(page, scale) {
        Ok(rendered) => {
            let data = Arc::new(rendered);
            cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key, Arc::clone(&data));
            RenderResponse::Page { id, page, data }
        }
        Err(error) => RenderResponse::Error { id, page, error },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::request::{RenderFault, RenderedPage};

    struct Counting {
        calls: usize,
    }

    impl PageRasterizer for Counting {
        fn rasterize(&mut self, page: usize, scale: f32) -> Result<RenderedPage, RenderFault> {
            self.calls += 1;
            if page == 99 {
                return Err(RenderFault::OutOfRange { page });
            }
            Ok(RenderedPage {
                page,
                scale,
                width_px: 600.0 * scale,
                height_px: 800.0 * scale,
                content: Vec::new(),
            })
        }
    }

    fn shared_cache() -> Arc<Mutex<PageCache>> {
        Arc::new(Mutex::new(PageCache::new(4)))
    }

    #[test]
    fn second_request_is_served_from_cache() {
        let mut rasterizer = Counting { calls: 0 };
        let cache = shared_cache();
        let cancelled = CancelSet::default();

        let first = handle_page_request(&mut rasterizer, RequestId(1), 3, 1.0, &cache, &cancelled);
        let second = handle_page_request(&mut rasterizer, RequestId(2), 3, 1.0, &cache, &cancelled);
        assert!(matches!(first, RenderResponse::Page { page: 3, .. }));
        assert!(matches!(second, RenderResponse::Page { page: 3, .. }));
        assert_eq!(rasterizer.calls, 1);
    }

    #[test]
    fn cancelled_request_is_not_rendered() {
        let mut rasterizer = Counting { calls: 0 };
        let cancelled = CancelSet::default();
        cancelled.lock().unwrap().insert(RequestId(7));

        let response =
            handle_page_request(&mut rasterizer, RequestId(7), 1, 1.0, &shared_cache(), &cancelled);
        assert!(matches!(
            response,
            RenderResponse::Cancelled { id: RequestId(7), page: 1 }
        ));
        assert_eq!(rasterizer.calls, 0);
    }

    #[test]
    fn faults_are_reported_per_page() {
        let mut rasterizer = Counting { calls: 0 };
        let cache = shared_cache();
        let response = handle_page_request(
            &mut rasterizer,
            RequestId(1),
            99,
            1.0,
            &cache,
            &CancelSet::default(),
        );
        assert!(matches!(response, RenderResponse::Error { page: 99, .. }));
        assert!(cache.lock().unwrap().is_empty());
    }
}

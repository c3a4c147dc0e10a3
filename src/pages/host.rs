//! Render host - manages the worker pool, cache, and in-flight requests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, trace};

use crate::settings::WindowSettings;

use super::cache::{CacheKey, PageCache};
use super::request::{PageRasterizer, RenderRequest, RenderResponse, RenderedPage, RequestId};
use super::worker::{CancelSet, render_worker};

#[derive(Debug)]
struct PendingRequest {
    page: usize,
    key: CacheKey,
}

/// Runs page rendering on worker threads.
///
/// Each worker owns its own rasterizer. Finished pages land in a shared
/// LRU cache so a page that scrolls back into view is served without
/// rendering it again.
pub struct RenderHost {
    request_tx: Sender<RenderRequest>,
    response_rx: Receiver<RenderResponse>,
    next_request_id: u64,
    pending: HashMap<RequestId, PendingRequest>,
    cancelled: CancelSet,
    ready: VecDeque<RenderResponse>,
    cache: Arc<Mutex<PageCache>>,
    workers: Vec<JoinHandle<()>>,
}

impl RenderHost {
    /// Spawn `settings.render_workers` workers, each with a rasterizer from `factory`
    pub fn new<F>(settings: &WindowSettings, mut factory: F) -> Self
    where
        F: FnMut() -> Box<dyn PageRasterizer>,
    {
        let cache = Arc::new(Mutex::new(PageCache::new(settings.content_cache_size)));
        let cancelled = CancelSet::default();

        // MPMC: every worker pulls from the same request queue
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();

        let workers = (0..settings.render_workers.max(1))
            .map(|_| {
                let rasterizer = factory();
                let rx = request_rx.clone();
                let tx = response_tx.clone();
                let cache = Arc::clone(&cache);
                let cancelled = Arc::clone(&cancelled);
                std::thread::spawn(move || render_worker(rasterizer, rx, tx, cache, cancelled))
            })
            .collect();

        Self {
            request_tx,
            response_rx,
            next_request_id: 1,
            pending: HashMap::new(),
            cancelled,
            ready: VecDeque::new(),
            cache,
            workers,
        }
    }

    /// Request `page` at `scale`.
    ///
    /// Returns `None` if the same render is already in flight. Requests for
    /// the page at another scale are cancelled.
    pub fn request(&mut self, page: usize, scale: f64) -> Option<RequestId> {
        let scale = scale as f32;
        let key = CacheKey::new(page, scale);

        if self.pending.values().any(|p| p.key == key) {
            return None;
        }
        self.cancel(page);

        let id = self.next_id();
        let cached = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key);
        if let Some(data) = cached {
            trace!("Page {page} served from cache");
            self.ready.push_back(RenderResponse::Page { id, page, data });
            return Some(id);
        }

        if let Err(e) = self
            .request_tx
            .send(RenderRequest::Page { id, page, scale })
        {
            error!("Render workers are gone: {e}");
            return None;
        }
        self.pending.insert(id, PendingRequest { page, key });
        Some(id)
    }

    /// Forget in-flight requests for `page`. Workers skip them if they have
    /// not started; finished results are discarded.
    pub fn cancel(&mut self, page: usize) {
        let ids: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.page == page)
            .map(|(id, _)| *id)
            .collect();
        if ids.is_empty() {
            return;
        }
        let mut cancelled = self.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            self.pending.remove(&id);
            cancelled.insert(id);
        }
    }

    /// Completed renders that are still wanted, without blocking
    pub fn poll(&mut self) -> Vec<RenderResponse> {
        let mut responses: Vec<RenderResponse> = self.ready.drain(..).collect();
        while let Ok(response) = self.response_rx.try_recv() {
            if let Some(response) = self.accept(response) {
                responses.push(response);
            }
        }
        responses
    }

    /// Like [`poll`](Self::poll), but waits up to `timeout` for the first
    /// result when nothing is ready
    pub fn wait(&mut self, timeout: Duration) -> Vec<RenderResponse> {
        if self.ready.is_empty() && !self.pending.is_empty() {
            match self.response_rx.recv_timeout(timeout) {
                Ok(response) => {
                    if let Some(response) = self.accept(response) {
                        self.ready.push_back(response);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    error!("Render workers disconnected");
                }
            }
        }
        self.poll()
    }

    fn accept(&mut self, response: RenderResponse) -> Option<RenderResponse> {
        let id = response.id();
        if self.pending.remove(&id).is_some() {
            return match response {
                RenderResponse::Cancelled { .. } => None,
                other => Some(other),
            };
        }
        self.cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        trace!("Dropping result for cancelled page {}", response.page());
        None
    }

    /// Whether any requested render has not come back yet
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || !self.ready.is_empty()
    }

    #[must_use]
    pub fn in_flight(&self, page: usize) -> bool {
        self.pending.values().any(|p| p.page == page)
    }

    #[must_use]
    pub fn cached(&self, page: usize, scale: f64) -> Option<Arc<RenderedPage>> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .peek(&CacheKey::new(page, scale as f32))
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

impl Drop for RenderHost {
    fn drop(&mut self) {
        for _ in 0..self.workers.len() {
            let _ = self.request_tx.send(RenderRequest::Shutdown);
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Render worker panicked");
            }
        }
        debug!("Render host shut down");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::pages::request::RenderFault;

    struct Fixed {
        calls: Arc<AtomicUsize>,
    }

    impl PageRasterizer for Fixed {
        fn rasterize(&mut self, page: usize, scale: f32) -> Result<RenderedPage, RenderFault> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if page == 13 {
                return Err(RenderFault::generic("bad xref"));
            }
            Ok(RenderedPage {
                page,
                scale,
                width_px: 500.0 * scale,
                height_px: 700.0 * scale,
                content: vec![1, 2, 3],
            })
        }
    }

    fn host(calls: &Arc<AtomicUsize>) -> RenderHost {
        let settings = WindowSettings {
            render_workers: 2,
            content_cache_size: 8,
            ..WindowSettings::default()
        };
        RenderHost::new(&settings, || {
            Box::new(Fixed {
                calls: Arc::clone(calls),
            })
        })
    }

    fn drain(host: &mut RenderHost) -> Vec<RenderResponse> {
        let mut all = Vec::new();
        while host.has_pending() {
            all.extend(host.wait(Duration::from_secs(5)));
        }
        all
    }

    #[test]
    fn renders_requested_pages() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut host = host(&calls);
        host.request(0, 1.0);
        host.request(1, 1.0);

        let mut pages: Vec<usize> = drain(&mut host).iter().map(RenderResponse::page).collect();
        pages.sort_unstable();
        assert_eq!(pages, vec![0, 1]);
        assert!(host.cached(1, 1.0).is_some());
    }

    #[test]
    fn duplicate_request_is_ignored() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut host = host(&calls);
        assert!(host.request(4, 1.0).is_some());
        assert!(host.request(4, 1.0).is_none());
        assert_eq!(drain(&mut host).len(), 1);
    }

    #[test]
    fn cached_page_skips_rasterizer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut host = host(&calls);
        host.request(2, 1.5);
        drain(&mut host);

        host.request(2, 1.5);
        let responses = host.poll();
        assert_eq!(responses.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_page_produces_no_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut host = host(&calls);
        host.request(5, 1.0);
        host.cancel(5);
        assert!(!host.in_flight(5));
        assert!(drain(&mut host).is_empty());
    }

    #[test]
    fn failures_come_back_as_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut host = host(&calls);
        host.request(13, 1.0);
        let responses = drain(&mut host);
        assert!(matches!(
            responses.as_slice(),
            [RenderResponse::Error { page: 13, .. }]
        ));
    }
}

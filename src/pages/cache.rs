//! LRU cache of rendered page content

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use super::request::RenderedPage;

/// Cache key for rendered pages
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Page index
    pub page: usize,
    /// Scale factor (stored as millionths for stable hashing)
    pub scale_millionths: u32,
}

impl CacheKey {
    #[must_use]
    pub fn new(page: usize, scale: f32) -> Self {
        Self {
            page,
            scale_millionths: (scale.max(0.0) * 1_000_000.0) as u32,
        }
    }
}

/// Keeps recently rendered pages so a page scrolled back into the
/// window is shown without rendering it again
pub struct PageCache {
    cache: LruCache<CacheKey, Arc<RenderedPage>>,
}

impl PageCache {
    /// Create a new cache with the given capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Get a cached page, promoting it in the LRU order
    #[must_use]
    pub fn get(&mut self, key: &CacheKey) -> Option<Arc<RenderedPage>> {
        self.cache.get(key).cloned()
    }

    /// Look up without promoting
    #[must_use]
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<RenderedPage>> {
        self.cache.peek(key).cloned()
    }

    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains(key)
    }

    pub fn insert(&mut self, key: CacheKey, data: Arc<RenderedPage>) {
        self.cache.put(key, data);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(page: usize, scale: f32) -> Arc<RenderedPage> {
        Arc::new(RenderedPage {
            page,
            scale,
            width_px: 850.0 * scale,
            height_px: 1100.0 * scale,
            content: vec![0; 16],
        })
    }

    #[test]
    fn keys_distinguish_scale() {
        let mut cache = PageCache::new(4);
        cache.insert(CacheKey::new(1, 1.0), page(1, 1.0));
        assert!(cache.contains(&CacheKey::new(1, 1.0)));
        assert!(!cache.contains(&CacheKey::new(1, 1.5)));
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = PageCache::new(2);
        cache.insert(CacheKey::new(0, 1.0), page(0, 1.0));
        cache.insert(CacheKey::new(1, 1.0), page(1, 1.0));
        let _ = cache.get(&CacheKey::new(0, 1.0));
        cache.insert(CacheKey::new(2, 1.0), page(2, 1.0));

        assert!(cache.contains(&CacheKey::new(0, 1.0)));
        assert!(!cache.contains(&CacheKey::new(1, 1.0)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn zero_capacity_holds_one() {
        assert_eq!(PageCache::new(0).capacity(), 1);
    }
}

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::image::RenderedImage;
use crate::PageIndex;

/// Page range kept when navigation settles, as offsets from the settled page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionWindow {
    pub behind: usize,
    pub ahead: usize,
}

impl RetentionWindow {
    pub fn contains(&self, center: PageIndex, page: PageIndex) -> bool {
        page + self.behind >= center && page <= center + self.ahead
    }
}

/// Bounded page-number to image map, evicting in insertion order.
#[derive(Debug)]
pub struct PageCache {
    entries: HashMap<PageIndex, RenderedImage>,
    order: VecDeque<PageIndex>,
    max_size: usize,
}

impl PageCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            max_size: max_size.max(1),
        }
    }

    pub fn get(&self, page: PageIndex) -> Option<&RenderedImage> {
        self.entries.get(&page)
    }

    pub fn contains(&self, page: PageIndex) -> bool {
        self.entries.contains_key(&page)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Pages in eviction order, oldest first.
    pub fn pages(&self) -> Vec<PageIndex> {
        self.order.iter().copied().collect()
    }

    /// Inserts or replaces `page`; a replaced entry keeps its original eviction slot.
    pub fn put(&mut self, page: PageIndex, image: RenderedImage) {
        if self.entries.insert(page, image).is_none() {
            self.order.push_back(page);
        }

        while self.entries.len() > self.max_size {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            debug!(page = oldest, "evicted oldest cached page");
        }
    }

    /// Drops every page outside `window` around `center`, regardless of age.
    pub fn retain_neighborhood(&mut self, center: PageIndex, window: RetentionWindow) -> usize {
        let before = self.entries.len();
        self.entries.retain(|&page, _| window.contains(center, page));
        let entries = &self.entries;
        self.order.retain(|page| entries.contains_key(page));
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!(center, evicted, "trimmed cache around settled page");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn image(tag: u8) -> RenderedImage {
        RenderedImage {
            width: 1,
            height: 1,
            png: Bytes::from(vec![tag]),
        }
    }

    #[test]
    fn size_never_exceeds_bound() {
        let mut cache = PageCache::new(3);
        for page in [1, 5, 2, 5, 9, 1, 7, 3, 3, 8] {
            cache.put(page, image(page as u8));
            assert!(cache.len() <= 3);
            assert_eq!(cache.pages().len(), cache.len());
        }
    }

    #[test]
    fn evicts_oldest_first() {
        let mut cache = PageCache::new(8);
        for page in 1..=10 {
            cache.put(page, image(page as u8));
        }
        assert_eq!(cache.pages(), (3..=10).collect::<Vec<_>>());
        assert!(cache.get(1).is_none());
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn overwrite_replaces_image_in_its_original_slot() {
        let mut cache = PageCache::new(2);
        cache.put(1, image(1));
        cache.put(2, image(2));
        cache.put(1, image(11));
        assert_eq!(cache.pages(), vec![1, 2]);
        assert_eq!(cache.get(1), Some(&image(11)));

        cache.put(3, image(3));
        assert_eq!(cache.pages(), vec![2, 3]);
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn retain_neighborhood_drops_far_pages() {
        let mut cache = PageCache::new(20);
        for page in 5..=16 {
            cache.put(page, image(page as u8));
        }
        let window = RetentionWindow {
            behind: 2,
            ahead: 3,
        };
        let evicted = cache.retain_neighborhood(10, window);
        assert_eq!(evicted, 6);
        assert_eq!(cache.pages(), vec![8, 9, 10, 11, 12, 13]);
        assert!(!cache.contains(7));
        assert!(!cache.contains(14));
    }

    #[test]
    fn retention_window_near_first_page() {
        let window = RetentionWindow {
            behind: 2,
            ahead: 3,
        };
        assert!(window.contains(1, 1));
        assert!(window.contains(1, 4));
        assert!(!window.contains(1, 5));
        assert!(window.contains(3, 1));
        assert!(!window.contains(4, 1));
    }
}

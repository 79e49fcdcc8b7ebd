use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, instrument, warn};

use crate::cache::{PageCache, RetentionWindow};
use crate::config::CacheConfig;
use crate::error::RenderError;
use crate::geometry::RenderTarget;
use crate::image::RenderedImage;
use crate::source::{DocumentHandle, PageDisplay};
use crate::PageIndex;

pub type RenderOutcome = Result<RenderedImage, RenderError>;

/// Handle to a render; every clone resolves to the same outcome.
pub type PendingRender = Shared<BoxFuture<'static, RenderOutcome>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Skip the cache and rasterize again, e.g. after the resolution changed.
    pub force: bool,
}

impl RenderOptions {
    pub const FORCE: RenderOptions = RenderOptions { force: true };
}

struct SchedulerState {
    cache: PageCache,
    in_flight: HashMap<PageIndex, PendingRender>,
}

/// Rasterizes pages on demand with at most one render per page in flight.
pub struct RenderScheduler {
    document: Arc<dyn DocumentHandle>,
    display: Arc<dyn PageDisplay>,
    state: Arc<Mutex<SchedulerState>>,
    target: Arc<RwLock<RenderTarget>>,
    radius: usize,
    retention: RetentionWindow,
}

impl RenderScheduler {
    pub fn new(
        document: Arc<dyn DocumentHandle>,
        display: Arc<dyn PageDisplay>,
        target: RenderTarget,
        config: &CacheConfig,
    ) -> Self {
        Self {
            document,
            display,
            state: Arc::new(Mutex::new(SchedulerState {
                cache: PageCache::new(config.max_size),
                in_flight: HashMap::new(),
            })),
            target: Arc::new(RwLock::new(target)),
            radius: config.neighborhood_radius,
            retention: RetentionWindow {
                behind: config.retain_behind,
                ahead: config.retain_ahead,
            },
        }
    }

    pub fn page_count(&self) -> usize {
        self.document.page_count()
    }

    pub fn render_target(&self) -> RenderTarget {
        *self.target.read()
    }

    /// Renders started after this call use `target`.
    pub fn retarget(&self, target: RenderTarget) {
        *self.target.write() = target;
    }

    /// Returns the cached image at once unless `force` is set, joins a render already in flight,
    /// or starts a new one. The cache check and the in-flight registration happen under one lock
    /// with no suspension point in between.
    pub fn request_render(&self, page: PageIndex, options: RenderOptions) -> PendingRender {
        let page_count = self.page_count();
        if page == 0 || page > page_count {
            return future::ready(Err(RenderError::OutOfRange { page, page_count }))
                .boxed()
                .shared();
        }

        let mut state = self.state.lock();
        if !options.force {
            if let Some(image) = state.cache.get(page).cloned() {
                drop(state);
                debug!(page, "page served from cache");
                self.display.apply_image(page, &image);
                return future::ready(Ok(image)).boxed().shared();
            }
        }
        if let Some(pending) = state.in_flight.get(&page) {
            debug!(page, "joining in-flight render");
            return pending.clone();
        }

        let job = RenderJob {
            page,
            document: Arc::clone(&self.document),
            display: Arc::clone(&self.display),
            state: Arc::clone(&self.state),
            target: Arc::clone(&self.target),
        };
        let handle = tokio::spawn(job.run());
        let pending = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(page, %err, "render task did not complete");
                    Err(RenderError::Aborted { page })
                }
            }
        }
        .boxed()
        .shared();
        state.in_flight.insert(page, pending.clone());
        pending
    }

    /// In-range pages within the pre-warm radius of `center`.
    pub fn neighborhood(&self, center: PageIndex) -> Vec<PageIndex> {
        let first = center.saturating_sub(self.radius).max(1);
        let last = center.saturating_add(self.radius).min(self.page_count());
        (first..=last).collect()
    }

    /// Requests the whole neighborhood without waiting for it.
    pub fn prewarm(&self, center: PageIndex) -> Vec<PendingRender> {
        self.neighborhood(center)
            .into_iter()
            .map(|page| self.request_render(page, RenderOptions::default()))
            .collect()
    }

    /// Requests the neighborhood concurrently and waits for every page. A failing page does not
    /// affect the others; its error is returned in its slot.
    #[instrument(skip(self))]
    pub async fn ensure_neighborhood(&self, center: PageIndex) -> Vec<RenderOutcome> {
        future::join_all(self.prewarm(center)).await
    }

    pub fn rerender(&self, pages: &[PageIndex]) -> Vec<PendingRender> {
        pages
            .iter()
            .map(|&page| self.request_render(page, RenderOptions::FORCE))
            .collect()
    }

    pub fn retain_neighborhood(&self, center: PageIndex) -> usize {
        self.state
            .lock()
            .cache
            .retain_neighborhood(center, self.retention)
    }

    pub fn cached(&self, page: PageIndex) -> Option<RenderedImage> {
        self.state.lock().cache.get(page).cloned()
    }

    pub fn cached_pages(&self) -> Vec<PageIndex> {
        self.state.lock().cache.pages()
    }

    pub fn in_flight_pages(&self) -> Vec<PageIndex> {
        let mut pages: Vec<_> = self.state.lock().in_flight.keys().copied().collect();
        pages.sort_unstable();
        pages
    }
}

struct RenderJob {
    page: PageIndex,
    document: Arc<dyn DocumentHandle>,
    display: Arc<dyn PageDisplay>,
    state: Arc<Mutex<SchedulerState>>,
    target: Arc<RwLock<RenderTarget>>,
}

impl RenderJob {
    async fn run(self) -> RenderOutcome {
        let mut marker = InFlightMarker {
            page: self.page,
            state: Arc::clone(&self.state),
            armed: true,
        };
        let outcome = self.rasterize().await;
        match &outcome {
            Ok(image) => {
                {
                    let mut state = self.state.lock();
                    state.cache.put(self.page, image.clone());
                    state.in_flight.remove(&self.page);
                    marker.armed = false;
                }
                self.display.apply_image(self.page, image);
            }
            Err(err) => warn!(page = self.page, %err, "page render failed"),
        }
        outcome
    }

    async fn rasterize(&self) -> RenderOutcome {
        let page = self.page;
        let handle = self
            .document
            .get_page(page)
            .await
            .map_err(|err| RenderError::PageFetch {
                page,
                message: format!("{err:#}"),
            })?;
        let size = handle.intrinsic_size();
        let scale = self.target.read().raster_scale(size);
        debug!(page, scale, "rasterizing page");
        let raster = handle
            .rasterize(scale)
            .await
            .map_err(|err| RenderError::Raster {
                page,
                message: format!("{err:#}"),
            })?;
        RenderedImage::encode(&raster).map_err(|err| RenderError::Encode {
            page,
            message: err.to_string(),
        })
    }
}

/// Clears the in-flight entry when a render ends without storing a result, including when the
/// task panics or is dropped.
struct InFlightMarker {
    page: PageIndex,
    state: Arc<Mutex<SchedulerState>>,
    armed: bool,
}

impl Drop for InFlightMarker {
    fn drop(&mut self) {
        if self.armed {
            self.state.lock().in_flight.remove(&self.page);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{DisplayMode, Size};
    use crate::testing::{FakeDocument, RecordingDisplay};

    fn target() -> RenderTarget {
        RenderTarget {
            frame: Size::new(1200.0, 800.0),
            display_mode: DisplayMode::Double,
            device_pixel_ratio: 1.0,
        }
    }

    fn scheduler(
        document: Arc<FakeDocument>,
        display: Arc<RecordingDisplay>,
        max_size: usize,
    ) -> RenderScheduler {
        let config = CacheConfig {
            max_size,
            ..CacheConfig::default()
        };
        RenderScheduler::new(document, display, target(), &config)
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_rasterization() {
        let document = Arc::new(FakeDocument::gated(20));
        let display = Arc::new(RecordingDisplay::default());
        let scheduler = scheduler(document.clone(), display.clone(), 8);

        let pending: Vec<_> = (0..5)
            .map(|_| scheduler.request_render(4, RenderOptions::default()))
            .collect();
        assert_eq!(scheduler.in_flight_pages(), vec![4]);

        document.open_gate();
        let outcomes = future::join_all(pending).await;

        assert_eq!(document.rasterizations(4), 1);
        let first = outcomes[0].clone().unwrap();
        assert!(outcomes.iter().all(|o| o.as_ref() == Ok(&first)));
        assert!(scheduler.in_flight_pages().is_empty());
        assert_eq!(scheduler.cached(4), Some(first));
        assert_eq!(display.pages(), vec![4]);
    }

    #[tokio::test]
    async fn cached_page_is_served_without_rasterizing() {
        let document = Arc::new(FakeDocument::new(10));
        let display = Arc::new(RecordingDisplay::default());
        let scheduler = scheduler(document.clone(), display.clone(), 8);

        let first = scheduler
            .request_render(3, RenderOptions::default())
            .await
            .unwrap();
        let second = scheduler
            .request_render(3, RenderOptions::default())
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(document.rasterizations(3), 1);
        assert_eq!(display.pages(), vec![3, 3]);
    }

    #[tokio::test]
    async fn forced_render_replaces_cached_image() {
        let document = Arc::new(FakeDocument::new(10));
        let display = Arc::new(RecordingDisplay::default());
        let scheduler = scheduler(document.clone(), display, 8);

        let first = scheduler
            .request_render(2, RenderOptions::default())
            .await
            .unwrap();
        let forced = scheduler.request_render(2, RenderOptions::FORCE).await.unwrap();

        assert_eq!(document.rasterizations(2), 2);
        assert_ne!(first, forced);
        assert_eq!(scheduler.cached(2), Some(forced));
    }

    #[tokio::test]
    async fn retarget_changes_raster_scale() {
        let document = Arc::new(FakeDocument::new(10));
        let display = Arc::new(RecordingDisplay::default());
        let scheduler = scheduler(document.clone(), display, 8);

        scheduler
            .request_render(1, RenderOptions::default())
            .await
            .unwrap();
        scheduler.retarget(RenderTarget {
            frame: Size::new(2400.0, 1600.0),
            ..target()
        });
        scheduler.request_render(1, RenderOptions::FORCE).await.unwrap();

        let scales = document.scales();
        assert_eq!(scales.len(), 2);
        assert!((scales[1] - 2.0 * scales[0]).abs() < 1e-4);
    }

    #[tokio::test]
    async fn failure_clears_marker_and_allows_retry() {
        let document = Arc::new(FakeDocument::new(10));
        document.fail_page(7);
        let display = Arc::new(RecordingDisplay::default());
        let scheduler = scheduler(document.clone(), display.clone(), 8);

        let err = scheduler
            .request_render(7, RenderOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::PageFetch { page: 7, .. }));
        assert!(scheduler.in_flight_pages().is_empty());
        assert!(scheduler.cached(7).is_none());
        assert!(display.pages().is_empty());

        document.heal_page(7);
        scheduler
            .request_render(7, RenderOptions::default())
            .await
            .unwrap();
        assert_eq!(scheduler.cached_pages(), vec![7]);
    }

    #[tokio::test]
    async fn raster_failure_is_reported_per_page() {
        let document = Arc::new(FakeDocument::new(10));
        document.fail_raster(5);
        let display = Arc::new(RecordingDisplay::default());
        let scheduler = scheduler(document, display, 8);

        let outcomes = scheduler.ensure_neighborhood(5).await;
        assert_eq!(outcomes.len(), 5);
        assert!(matches!(
            outcomes[2],
            Err(RenderError::Raster { page: 5, .. })
        ));
        let mut cached = scheduler.cached_pages();
        cached.sort_unstable();
        assert_eq!(cached, vec![3, 4, 6, 7]);
    }

    #[tokio::test]
    async fn neighborhood_is_clipped_to_document() {
        let document = Arc::new(FakeDocument::new(4));
        let display = Arc::new(RecordingDisplay::default());
        let scheduler = scheduler(document, display, 8);

        assert_eq!(scheduler.neighborhood(1), vec![1, 2, 3]);
        assert_eq!(scheduler.neighborhood(4), vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn out_of_range_request_fails_without_rasterizing() {
        let document = Arc::new(FakeDocument::new(4));
        let display = Arc::new(RecordingDisplay::default());
        let scheduler = scheduler(document.clone(), display, 8);

        for page in [0, 5] {
            let err = scheduler
                .request_render(page, RenderOptions::default())
                .await
                .unwrap_err();
            assert_eq!(
                err,
                RenderError::OutOfRange {
                    page,
                    page_count: 4
                }
            );
        }
        assert_eq!(document.total_rasterizations(), 0);
    }

    #[tokio::test]
    async fn sequential_renders_keep_newest_pages() {
        let document = Arc::new(FakeDocument::new(40));
        let display = Arc::new(RecordingDisplay::default());
        let scheduler = scheduler(document, display, 8);

        for page in 1..=10 {
            scheduler
                .request_render(page, RenderOptions::default())
                .await
                .unwrap();
        }
        assert_eq!(scheduler.cached_pages(), (3..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn retention_trims_around_settled_page() {
        let document = Arc::new(FakeDocument::new(40));
        let display = Arc::new(RecordingDisplay::default());
        let scheduler = scheduler(document, display, 20);

        for page in 6..=15 {
            scheduler
                .request_render(page, RenderOptions::default())
                .await
                .unwrap();
        }
        scheduler.retain_neighborhood(10);
        let mut cached = scheduler.cached_pages();
        cached.sort_unstable();
        assert_eq!(cached, vec![8, 9, 10, 11, 12, 13]);
    }
}

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use tracing::{debug, info, instrument, warn};

use crate::config::ViewerConfig;
use crate::error::LoadError;
use crate::geometry::{DisplayMode, Point, Size, ViewTransform};
use crate::navigation::{
    next_view_page, page_indicator, previous_view_page, spread, AnimatorPhase, FlipSurface,
    NavigationAnimator,
};
use crate::scheduler::RenderScheduler;
use crate::source::{
    DisplayCapabilities, DocumentHandle, DocumentInfo, DocumentProvider, PageDisplay,
};
use crate::toc::TableOfContents;
use crate::viewport::{Gesture, ViewportController, ViewportEvent};
use crate::PageIndex;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    NextPage,
    PrevPage,
    GotoPage { page: PageIndex },
    LastPage,
    NextSection,
    PrevSection,
    JumpToSection { page: PageIndex },
    ZoomIn { focus: Option<Point> },
    ZoomOut { focus: Option<Point> },
    ResetZoom,
    AdjustViewport { delta_x: f32, delta_y: f32 },
    Gesture(Gesture),
}

/// The front end's side of the viewer.
pub struct Collaborators {
    pub display: Arc<dyn PageDisplay>,
    pub surface: Arc<dyn FlipSurface>,
    pub capabilities: Arc<dyn DisplayCapabilities>,
}

pub struct Viewer {
    document: Arc<dyn DocumentHandle>,
    scheduler: Arc<RenderScheduler>,
    viewport: ViewportController,
    animator: NavigationAnimator,
    surface: Arc<dyn FlipSurface>,
    toc: TableOfContents,
    jump_threshold: usize,
    settled_page: Option<PageIndex>,
}

impl Viewer {
    #[instrument(
        skip(provider, locator, collaborators, config),
        fields(locator = %locator.display())
    )]
    pub async fn open_with<P: DocumentProvider + ?Sized>(
        provider: &P,
        locator: &Path,
        collaborators: Collaborators,
        container: Size,
        config: ViewerConfig,
    ) -> Result<Self, LoadError> {
        let document = provider
            .open(locator)
            .await
            .map_err(|err| LoadError::new(locator, err))?;
        if document.page_count() == 0 {
            return Err(LoadError::new(locator, anyhow!("document has no pages")));
        }

        let page_ratio =
            determine_page_ratio(document.as_ref(), config.layout.default_page_ratio).await;
        let viewport = ViewportController::new(
            &config,
            collaborators.capabilities,
            container,
            page_ratio,
        );
        let scheduler = Arc::new(RenderScheduler::new(
            Arc::clone(&document),
            collaborators.display,
            viewport.render_target(),
            &config.cache,
        ));
        let animator = NavigationAnimator::new(
            Arc::clone(&collaborators.surface),
            Arc::clone(&scheduler),
            config.animation.clone(),
        );
        let toc = match document.outline() {
            Ok(sections) => TableOfContents::from_sections(sections),
            Err(err) => {
                warn!(?err, "failed to read document outline");
                TableOfContents::default()
            }
        };

        let mut viewer = Self {
            document,
            scheduler,
            viewport,
            animator,
            surface: collaborators.surface,
            toc,
            jump_threshold: config.animation.jump_threshold,
            settled_page: None,
        };

        let failures = viewer
            .scheduler
            .ensure_neighborhood(1)
            .await
            .iter()
            .filter(|outcome| outcome.is_err())
            .count();
        if failures > 0 {
            warn!(failures, "some opening pages failed to render");
        }
        viewer.surface.turn_to(1);
        viewer.page_settled(1);
        info!(
            pages = viewer.page_count(),
            mode = ?viewer.display_mode(),
            "document opened"
        );
        Ok(viewer)
    }

    pub fn info(&self) -> &DocumentInfo {
        self.document.info()
    }

    pub fn page_count(&self) -> usize {
        self.document.page_count()
    }

    pub fn current_page(&self) -> PageIndex {
        self.surface.current_page()
    }

    pub fn page_indicator(&self) -> Option<String> {
        page_indicator(self.current_page(), self.page_count())
    }

    pub fn zoom_label(&self) -> String {
        self.viewport.zoom_label()
    }

    pub fn transform(&self) -> ViewTransform {
        self.viewport.transform()
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.viewport.display_mode()
    }

    pub fn visible_pages(&self) -> Vec<PageIndex> {
        spread(self.current_page(), self.display_mode(), self.page_count())
    }

    pub fn scheduler(&self) -> &Arc<RenderScheduler> {
        &self.scheduler
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn animation(&self) -> AnimatorPhase {
        self.animator.phase()
    }

    pub fn table_of_contents(&self) -> &TableOfContents {
        &self.toc
    }

    /// Replaces the outline-derived sections, e.g. with an external table of contents.
    pub fn set_table_of_contents(&mut self, toc: TableOfContents) {
        if !toc.is_empty() {
            self.toc = toc;
        }
    }

    /// Applies a command; returns whether anything visible changed.
    pub fn apply(&mut self, command: Command) -> bool {
        let current = self.current_page();
        let page_count = self.page_count();
        let mode = self.display_mode();
        match command {
            Command::NextPage => self.turn(next_view_page(current, mode, page_count)),
            Command::PrevPage => self.turn(previous_view_page(current, mode, page_count)),
            Command::GotoPage { page } => self.go_to_page(page),
            Command::LastPage => self.go_to_page(page_count),
            Command::NextSection => match self.toc.next_after(current) {
                Some(section) => {
                    let page = section.page;
                    self.jump_to_section(page)
                }
                None => false,
            },
            Command::PrevSection => match self.toc.previous_before(current) {
                Some(section) => {
                    let page = section.page;
                    self.jump_to_section(page)
                }
                None => false,
            },
            Command::JumpToSection { page } => self.jump_to_section(page),
            Command::ZoomIn { focus } => {
                self.viewport.zoom_in(focus);
                self.dispatch()
            }
            Command::ZoomOut { focus } => {
                self.viewport.zoom_out(focus);
                self.dispatch()
            }
            Command::ResetZoom => {
                self.viewport.reset_zoom();
                self.dispatch()
            }
            Command::AdjustViewport { delta_x, delta_y } => {
                self.viewport.pan_by(delta_x, delta_y);
                self.dispatch()
            }
            Command::Gesture(gesture) => {
                self.viewport.handle_gesture(gesture);
                self.dispatch()
            }
        }
    }

    /// Short hops turn directly; longer ones are animated.
    pub fn go_to_page(&mut self, page: PageIndex) -> bool {
        let page = page.clamp(1, self.page_count());
        let current = self.current_page();
        if page == current {
            return false;
        }
        if page.abs_diff(current) > self.jump_threshold {
            self.animator.start(page)
        } else {
            self.turn(page)
        }
    }

    pub fn jump_to_section(&mut self, page: PageIndex) -> bool {
        self.animator.start(page)
    }

    fn turn(&mut self, page: PageIndex) -> bool {
        self.animator.cancel();
        if page == self.current_page() {
            return false;
        }
        self.surface.turn_to(page);
        self.scheduler.prewarm(page);
        true
    }

    pub fn resize(&mut self, container: Size, now: Instant) {
        self.viewport.note_resize(container, now);
    }

    /// Applies a due resize and reacts to page changes made by the flip surface. Returns whether
    /// a redraw is needed.
    pub fn poll(&mut self, now: Instant) -> bool {
        let resized = self.viewport.poll_resize(now) && self.dispatch();
        let current = self.current_page();
        let turned = self.settled_page != Some(current);
        if turned {
            self.page_settled(current);
        }
        resized || turned
    }

    /// Navigation came to rest on `page`: drop cached pages outside its neighborhood.
    pub fn page_settled(&mut self, page: PageIndex) {
        self.scheduler.retain_neighborhood(page);
        self.settled_page = Some(page);
    }

    fn dispatch(&mut self) -> bool {
        let events = self.viewport.drain_events();
        for event in &events {
            match event {
                ViewportEvent::ResolutionChanged(target) => {
                    self.scheduler.retarget(*target);
                    let visible = self.visible_pages();
                    debug!(?visible, "resolution changed, re-rendering visible pages");
                    self.scheduler.rerender(&visible);
                }
                ViewportEvent::DisplayModeChanged(mode) => {
                    info!(?mode, "display mode changed");
                }
                ViewportEvent::TransformChanged(_) => {}
            }
        }
        !events.is_empty()
    }
}

async fn determine_page_ratio(document: &dyn DocumentHandle, fallback: f32) -> f32 {
    match document.get_page(1).await {
        Ok(page) => page.intrinsic_size().aspect_ratio().unwrap_or(fallback),
        Err(err) => {
            warn!(?err, "unable to determine page ratio");
            fallback
        }
    }
}

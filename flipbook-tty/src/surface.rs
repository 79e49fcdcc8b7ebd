use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use flipbook_core::{DisplayCapabilities, FlipSurface, PageDisplay, PageIndex, RenderedImage};
use parking_lot::Mutex;
use tracing::trace;

/// Set by collaborators when the screen is out of date; cleared by the draw loop.
#[derive(Debug, Clone, Default)]
pub struct RedrawFlag(Arc<AtomicBool>);

impl RedrawFlag {
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Latest image delivered for each page.
pub struct DisplaySlots {
    images: Mutex<HashMap<PageIndex, RenderedImage>>,
    redraw: RedrawFlag,
}

impl DisplaySlots {
    pub fn new(redraw: RedrawFlag) -> Self {
        Self {
            images: Mutex::new(HashMap::new()),
            redraw,
        }
    }

    pub fn image(&self, page: PageIndex) -> Option<RenderedImage> {
        self.images.lock().get(&page).cloned()
    }

    /// Forgets images for pages not in `keep`.
    pub fn retain(&self, keep: &[PageIndex]) {
        self.images.lock().retain(|page, _| keep.contains(page));
    }
}

impl PageDisplay for DisplaySlots {
    fn apply_image(&self, page: PageIndex, image: &RenderedImage) {
        trace!(page, width = image.width, height = image.height, "page image updated");
        self.images.lock().insert(page, image.clone());
        self.redraw.raise();
    }
}

/// Page-turn state for the terminal, which turns instantly.
pub struct TerminalFlip {
    current: AtomicUsize,
    redraw: RedrawFlag,
}

impl TerminalFlip {
    pub fn new(redraw: RedrawFlag) -> Self {
        Self {
            current: AtomicUsize::new(1),
            redraw,
        }
    }
}

impl FlipSurface for TerminalFlip {
    fn current_page(&self) -> PageIndex {
        self.current.load(Ordering::Acquire)
    }

    fn turn_to(&self, page: PageIndex) {
        if self.current.swap(page, Ordering::AcqRel) != page {
            self.redraw.raise();
        }
    }
}

/// Terminal pixels are treated as device pixels.
pub struct TerminalCapabilities {
    viewport_width: AtomicU32,
}

impl TerminalCapabilities {
    pub fn new(viewport_width: f32) -> Self {
        Self {
            viewport_width: AtomicU32::new(viewport_width.to_bits()),
        }
    }

    pub fn set_viewport_width(&self, width: f32) {
        self.viewport_width.store(width.to_bits(), Ordering::Release);
    }
}

impl DisplayCapabilities for TerminalCapabilities {
    fn device_pixel_ratio(&self) -> f32 {
        1.0
    }

    fn viewport_width(&self) -> f32 {
        f32::from_bits(self.viewport_width.load(Ordering::Acquire))
    }
}

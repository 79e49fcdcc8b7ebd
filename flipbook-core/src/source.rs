use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::toc::Section;
use crate::PageIndex;

#[derive(Debug, Clone, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub page_count: usize,
    pub metadata: DocumentMetadata,
}

/// Intrinsic page dimensions in document units (points for PDF).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn aspect_ratio(&self) -> Option<f32> {
        if self.width > 0.0 && self.height > 0.0 && self.width.is_finite() && self.height.is_finite()
        {
            Some(self.width / self.height)
        } else {
            None
        }
    }
}

/// Raw RGBA8 pixels produced by a rasterization.
#[derive(Debug, Clone)]
pub struct RasterBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[async_trait::async_trait]
pub trait PageHandle: Send + Sync {
    fn intrinsic_size(&self) -> PageSize;
    async fn rasterize(&self, scale: f32) -> Result<RasterBuffer>;
}

#[async_trait::async_trait]
pub trait DocumentHandle: Send + Sync {
    fn info(&self) -> &DocumentInfo;

    fn page_count(&self) -> usize {
        self.info().page_count
    }

    async fn get_page(&self, page: PageIndex) -> Result<Arc<dyn PageHandle>>;

    /// Sections embedded in the document itself, used when no external table of contents exists.
    fn outline(&self) -> Result<Vec<Section>> {
        Ok(Vec::new())
    }
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, locator: &Path) -> Result<Arc<dyn DocumentHandle>>;
}

/// Receives every completed render. Implementations must tolerate repeated calls with the same image.
pub trait PageDisplay: Send + Sync {
    fn apply_image(&self, page: PageIndex, image: &crate::RenderedImage);
}

/// Environment facts the core needs but must not probe itself.
pub trait DisplayCapabilities: Send + Sync {
    fn device_pixel_ratio(&self) -> f32;
    /// Width used for device-class breakpoints.
    fn viewport_width(&self) -> f32;
}

/// Fixed capabilities, handy for tests and headless use.
#[derive(Debug, Clone, Copy)]
pub struct StaticCapabilities {
    pub device_pixel_ratio: f32,
    pub viewport_width: f32,
}

impl DisplayCapabilities for StaticCapabilities {
    fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }

    fn viewport_width(&self) -> f32 {
        self.viewport_width
    }
}

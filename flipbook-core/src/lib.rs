//! Core of the flipbook viewer: page geometry, render scheduling and caching, viewport control
//! and animated navigation. Rasterization and display are supplied by the front end through the
//! traits in [`source`] and [`navigation`].

pub mod cache;
pub mod config;
pub mod error;
pub mod geometry;
pub mod image;
pub mod navigation;
pub mod scheduler;
pub mod source;
pub mod toc;
pub mod viewer;
pub mod viewport;

#[cfg(test)]
mod testing;

/// 1-based page number.
pub type PageIndex = usize;

pub use cache::{PageCache, RetentionWindow};
pub use config::ViewerConfig;
pub use error::{ConfigError, LoadError, RenderError, TocError};
pub use geometry::{DisplayMode, Point, RenderTarget, Size, ViewTransform};
pub use image::RenderedImage;
pub use navigation::{AnimatorPhase, FlipSurface, NavigationAnimator};
pub use scheduler::{PendingRender, RenderOptions, RenderOutcome, RenderScheduler};
pub use source::{
    DisplayCapabilities, DocumentHandle, DocumentInfo, DocumentMetadata, DocumentProvider,
    PageDisplay, PageHandle, PageSize, RasterBuffer, StaticCapabilities,
};
pub use toc::{Section, TableOfContents};
pub use viewer::{Collaborators, Command, Viewer};
pub use viewport::{Gesture, ViewportController, ViewportEvent};

use std::path::PathBuf;

use thiserror::Error;

use crate::PageIndex;

/// The document could not be opened. Fatal to the viewing session.
#[derive(Debug, Error)]
#[error("failed to open document {locator:?}")]
pub struct LoadError {
    pub locator: PathBuf,
    #[source]
    pub source: anyhow::Error,
}

impl LoadError {
    pub fn new(locator: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        Self {
            locator: locator.into(),
            source,
        }
    }
}

/// Per-page failure. Shared by every caller joined on the same render, hence `Clone`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("page {page} is outside 1..={page_count}")]
    OutOfRange { page: PageIndex, page_count: usize },
    #[error("failed to fetch page {page}: {message}")]
    PageFetch { page: PageIndex, message: String },
    #[error("failed to rasterize page {page}: {message}")]
    Raster { page: PageIndex, message: String },
    #[error("failed to encode page {page}: {message}")]
    Encode { page: PageIndex, message: String },
    #[error("render of page {page} stopped before completion")]
    Aborted { page: PageIndex },
}

impl RenderError {
    pub fn page(&self) -> PageIndex {
        match self {
            RenderError::OutOfRange { page, .. }
            | RenderError::PageFetch { page, .. }
            | RenderError::Raster { page, .. }
            | RenderError::Encode { page, .. }
            | RenderError::Aborted { page } => *page,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum TocError {
    #[error("failed to read table of contents {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed table of contents")]
    Parse(#[from] serde_json::Error),
}

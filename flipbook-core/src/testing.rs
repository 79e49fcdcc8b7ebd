//! In-memory collaborators shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::image::RenderedImage;
use crate::navigation::FlipSurface;
use crate::source::{
    DocumentHandle, DocumentInfo, DocumentMetadata, DocumentProvider, PageDisplay, PageHandle,
    PageSize, RasterBuffer,
};
use crate::toc::Section;
use crate::PageIndex;

pub const PAGE_SIZE: PageSize = PageSize {
    width: 600.0,
    height: 800.0,
};

#[derive(Default)]
struct Ledger {
    rasterizations: HashMap<PageIndex, usize>,
    scales: Vec<f32>,
    failing_fetch: HashSet<PageIndex>,
    failing_raster: HashSet<PageIndex>,
}

pub struct FakeDocument {
    info: DocumentInfo,
    ledger: Arc<Mutex<Ledger>>,
    gate: Option<Arc<Semaphore>>,
    outline: Vec<Section>,
}

impl FakeDocument {
    pub fn new(page_count: usize) -> Self {
        Self {
            info: DocumentInfo {
                path: PathBuf::from("/tmp/fake.pdf"),
                page_count,
                metadata: DocumentMetadata::default(),
            },
            ledger: Arc::new(Mutex::new(Ledger::default())),
            gate: None,
            outline: Vec::new(),
        }
    }

    /// Rasterization blocks until [`FakeDocument::open_gate`] is called.
    pub fn gated(page_count: usize) -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::new(page_count)
        }
    }

    pub fn with_outline(mut self, outline: Vec<Section>) -> Self {
        self.outline = outline;
        self
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn fail_page(&self, page: PageIndex) {
        self.ledger.lock().failing_fetch.insert(page);
    }

    pub fn heal_page(&self, page: PageIndex) {
        self.ledger.lock().failing_fetch.remove(&page);
    }

    pub fn fail_raster(&self, page: PageIndex) {
        self.ledger.lock().failing_raster.insert(page);
    }

    pub fn rasterizations(&self, page: PageIndex) -> usize {
        self.ledger
            .lock()
            .rasterizations
            .get(&page)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_rasterizations(&self) -> usize {
        self.ledger.lock().rasterizations.values().sum()
    }

    pub fn scales(&self) -> Vec<f32> {
        self.ledger.lock().scales.clone()
    }
}

struct FakePage {
    page: PageIndex,
    ledger: Arc<Mutex<Ledger>>,
    gate: Option<Arc<Semaphore>>,
}

#[async_trait::async_trait]
impl PageHandle for FakePage {
    fn intrinsic_size(&self) -> PageSize {
        PAGE_SIZE
    }

    async fn rasterize(&self, scale: f32) -> Result<RasterBuffer> {
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        let mut ledger = self.ledger.lock();
        if ledger.failing_raster.contains(&self.page) {
            return Err(anyhow!("corrupt content stream"));
        }
        ledger.scales.push(scale);
        let count = ledger.rasterizations.entry(self.page).or_insert(0);
        *count += 1;
        Ok(RasterBuffer {
            width: 1,
            height: 1,
            pixels: vec![self.page as u8, *count as u8, 0, 255],
        })
    }
}

#[async_trait::async_trait]
impl DocumentHandle for FakeDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    async fn get_page(&self, page: PageIndex) -> Result<Arc<dyn PageHandle>> {
        if self.ledger.lock().failing_fetch.contains(&page) {
            return Err(anyhow!("page {page} missing from xref"));
        }
        Ok(Arc::new(FakePage {
            page,
            ledger: Arc::clone(&self.ledger),
            gate: self.gate.clone(),
        }))
    }

    fn outline(&self) -> Result<Vec<Section>> {
        Ok(self.outline.clone())
    }
}

pub struct FakeProvider {
    pub document: Arc<FakeDocument>,
}

#[async_trait::async_trait]
impl DocumentProvider for FakeProvider {
    async fn open(&self, locator: &Path) -> Result<Arc<dyn DocumentHandle>> {
        if locator.ends_with("missing.pdf") {
            return Err(anyhow!("no such file"));
        }
        Ok(self.document.clone())
    }
}

#[derive(Default)]
pub struct RecordingDisplay {
    applied: Mutex<Vec<(PageIndex, RenderedImage)>>,
}

impl RecordingDisplay {
    pub fn pages(&self) -> Vec<PageIndex> {
        self.applied.lock().iter().map(|(page, _)| *page).collect()
    }
}

impl PageDisplay for RecordingDisplay {
    fn apply_image(&self, page: PageIndex, image: &RenderedImage) {
        self.applied.lock().push((page, image.clone()));
    }
}

pub struct RecordingSurface {
    current: AtomicUsize,
    visits: Mutex<Vec<PageIndex>>,
}

impl RecordingSurface {
    pub fn new(current: PageIndex) -> Self {
        Self {
            current: AtomicUsize::new(current),
            visits: Mutex::new(Vec::new()),
        }
    }

    pub fn visits(&self) -> Vec<PageIndex> {
        self.visits.lock().clone()
    }
}

impl FlipSurface for RecordingSurface {
    fn current_page(&self) -> PageIndex {
        self.current.load(Ordering::SeqCst)
    }

    fn turn_to(&self, page: PageIndex) {
        self.current.store(page, Ordering::SeqCst);
        self.visits.lock().push(page);
    }
}

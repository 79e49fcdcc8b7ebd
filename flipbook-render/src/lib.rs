use std::convert::TryFrom;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use flipbook_core::{
    DocumentHandle, DocumentInfo, DocumentMetadata, DocumentProvider, PageHandle, PageIndex,
    PageSize, RasterBuffer, Section,
};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

/// Environment variable naming a pdfium shared library to bind before the usual locations.
pub const PDFIUM_LIBRARY_ENV: &str = "FLIPBOOK_PDFIUM_LIBRARY_PATH";

pub struct PdfiumRenderFactory {
    pdfium: Arc<Pdfium>,
}

impl PdfiumRenderFactory {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumRenderFactory {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentHandle>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let pdfium = Arc::clone(&self.pdfium);
        let document = tokio::task::spawn_blocking(move || PdfiumDocument::load(pdfium, absolute))
            .await
            .context("document loading task failed")??;
        Ok(Arc::new(document))
    }
}

/// Lazily opened pdfium document shared by the document and its page handles.
struct SharedDocument {
    // Declared before `pdfium` so it is dropped first.
    document: Mutex<Option<PdfDocument<'static>>>,
    pdfium: Arc<Pdfium>,
    path: PathBuf,
}

impl SharedDocument {
    fn open_document(&self) -> Result<PdfDocument<'static>> {
        let document = self
            .pdfium
            .load_pdf_from_file(&self.path, None)
            .with_context(|| format!("failed to open {:?}", self.path))?;
        // SAFETY: the document borrows the bindings owned by `self.pdfium`. It lives in
        // `self.document`, which drops before `self.pdfium`, and never leaves this struct.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(document)
    }

    fn with_document<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PdfDocument<'static>) -> Result<R>,
    {
        let mut guard = self.document.lock();
        let document = match guard.take() {
            Some(document) => document,
            None => self.open_document()?,
        };
        let result = f(&document);
        *guard = Some(document);
        result
    }

    fn page_size(&self, page: PageIndex) -> Result<PageSize> {
        self.with_document(|document| {
            let pdf_page = document
                .pages()
                .get(pdf_page_index(page)?)
                .with_context(|| format!("page {page} out of range"))?;
            Ok(PageSize {
                width: pdf_page.width().value,
                height: pdf_page.height().value,
            })
        })
    }

    #[instrument(skip(self))]
    fn render(&self, page: PageIndex, scale: f32) -> Result<RasterBuffer> {
        self.with_document(|document| {
            let pdf_page = document
                .pages()
                .get(pdf_page_index(page)?)
                .with_context(|| format!("page {page} out of range"))?;
            let config = PdfRenderConfig::new().scale_page_by_factor(scale.max(0.1));
            let bitmap = pdf_page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page {page}"))?;
            let pixels = bitmap.as_image().to_rgba8().into_raw();
            debug!(
                page,
                width = bitmap.width(),
                height = bitmap.height(),
                "rasterized page"
            );
            Ok(RasterBuffer {
                width: u32::try_from(bitmap.width()).unwrap_or_default(),
                height: u32::try_from(bitmap.height()).unwrap_or_default(),
                pixels,
            })
        })
    }
}

struct PdfiumDocument {
    shared: Arc<SharedDocument>,
    info: DocumentInfo,
    outline_cache: Mutex<Option<Vec<Section>>>,
}

impl PdfiumDocument {
    fn load(pdfium: Arc<Pdfium>, path: PathBuf) -> Result<Self> {
        let shared = SharedDocument {
            document: Mutex::new(None),
            pdfium,
            path: path.clone(),
        };
        let info = shared.with_document(|document| Ok(build_document_info(document, &path)))?;
        Ok(Self {
            shared: Arc::new(shared),
            info,
            outline_cache: Mutex::new(None),
        })
    }
}

#[async_trait]
impl DocumentHandle for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    async fn get_page(&self, page: PageIndex) -> Result<Arc<dyn PageHandle>> {
        let shared = Arc::clone(&self.shared);
        let size = tokio::task::spawn_blocking(move || shared.page_size(page))
            .await
            .context("page lookup task failed")??;
        Ok(Arc::new(PdfiumPage {
            shared: Arc::clone(&self.shared),
            page,
            size,
        }))
    }

    fn outline(&self) -> Result<Vec<Section>> {
        {
            let cache = self.outline_cache.lock();
            if let Some(cached) = cache.as_ref() {
                return Ok(cached.clone());
            }
        }

        let outline = self.shared.with_document(|document| {
            let mut outline = Vec::new();
            if let Some(root) = document.bookmarks().root() {
                collect_outline(root, &mut outline);
            }
            Ok(outline)
        })?;

        *self.outline_cache.lock() = Some(outline.clone());
        Ok(outline)
    }
}

struct PdfiumPage {
    shared: Arc<SharedDocument>,
    page: PageIndex,
    size: PageSize,
}

#[async_trait]
impl PageHandle for PdfiumPage {
    fn intrinsic_size(&self) -> PageSize {
        self.size
    }

    async fn rasterize(&self, scale: f32) -> Result<RasterBuffer> {
        let shared = Arc::clone(&self.shared);
        let page = self.page;
        tokio::task::spawn_blocking(move || shared.render(page, scale))
            .await
            .context("render task failed")?
    }
}

fn pdf_page_index(page: PageIndex) -> Result<PdfPageIndex> {
    page.checked_sub(1)
        .and_then(|index| PdfPageIndex::try_from(index).ok())
        .ok_or_else(|| anyhow!("page {page} is out of supported range"))
}

fn collect_outline(mut bookmark: PdfBookmark<'_>, out: &mut Vec<Section>) {
    loop {
        if let (Some(title), Some(destination)) = (bookmark.title(), bookmark.destination()) {
            if let Ok(page_index) = destination.page_index() {
                out.push(Section {
                    title,
                    page: page_index as usize + 1,
                });
            }
        }

        if let Some(child) = bookmark.first_child() {
            collect_outline(child, out);
        }

        match bookmark.next_sibling() {
            Some(next) => bookmark = next,
            None => break,
        }
    }
}

fn build_document_info(document: &PdfDocument<'_>, path: &Path) -> DocumentInfo {
    let page_count = usize::try_from(document.pages().len()).unwrap_or_default();
    let metadata = document.metadata();
    let title = metadata
        .get(PdfDocumentMetadataTagType::Title)
        .map(|t| t.value().to_owned());
    let author = metadata
        .get(PdfDocumentMetadataTagType::Author)
        .map(|t| t.value().to_owned());

    DocumentInfo {
        path: path.to_path_buf(),
        page_count,
        metadata: DocumentMetadata { title, author },
    }
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    let path = std::env::var_os(PDFIUM_LIBRARY_ENV).filter(|path| !path.is_empty())?;
    match Pdfium::bind_to_library(&path) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!(
                path = %Path::new(&path).display(),
                %err,
                "failed to load pdfium from {PDFIUM_LIBRARY_ENV}"
            );
            None
        }
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set {PDFIUM_LIBRARY_ENV} or install it ({})",
                errors.join(", ")
            ))
        }
    }
}

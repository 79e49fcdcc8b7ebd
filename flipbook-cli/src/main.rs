use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use flipbook_core::{
    Collaborators, Command, LoadError, TableOfContents, Viewer, ViewerConfig,
};
use flipbook_render::PdfiumRenderFactory;
use flipbook_tty::{
    layout_spread, write_status_line, CellGeometry, DisplaySlots, EventMapper, KittyRenderer,
    RedrawFlag, TerminalCapabilities, TerminalFlip, UiEvent,
};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "flipbook",
    version,
    about = "Page-flip document viewer for kitty-compatible terminals"
)]
struct Args {
    /// Page to open the document on (1-based)
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,

    /// Configuration file; defaults to config.toml in the platform config directory
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Table of contents as JSON: {"sections": [{"title": "...", "page": 3}]}
    #[arg(long = "toc")]
    toc: Option<PathBuf>,

    /// Document to open
    file: PathBuf,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        crossterm::execute!(io::stdout(), EnableMouseCapture, cursor::Hide)?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, DisableMouseCapture, cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "flipbook", "flipbook")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;
    let config =
        ViewerConfig::load_or_default(args.config.as_deref()).context("invalid configuration")?;

    let mut cells = CellGeometry::from_window(&terminal::window_size()?);
    let redraw = RedrawFlag::default();
    let display = Arc::new(DisplaySlots::new(redraw.clone()));
    let capabilities = Arc::new(TerminalCapabilities::new(cells.container().width));
    let collaborators = Collaborators {
        display: display.clone(),
        surface: Arc::new(TerminalFlip::new(redraw.clone())),
        capabilities: capabilities.clone(),
    };

    let provider = PdfiumRenderFactory::new()?;
    let opened =
        Viewer::open_with(&provider, &args.file, collaborators, cells.container(), config).await;
    let mut viewer = match opened {
        Ok(viewer) => viewer,
        Err(err) => {
            error!(error = ?err, "unable to open document");
            eprintln!("flipbook: {}", open_failure_message(&err));
            return Ok(ExitCode::FAILURE);
        }
    };
    if let Some(path) = &args.toc {
        let toc = TableOfContents::load(path)
            .with_context(|| format!("failed to read table of contents {:?}", path))?;
        viewer.set_table_of_contents(toc);
    }
    if let Some(page) = args.page {
        viewer.apply(Command::GotoPage { page });
    }

    let _raw = RawModeGuard::new()?;
    let mut renderer = KittyRenderer::new(io::stdout());
    let mut event_mapper = EventMapper::new();
    event_mapper.set_cells(cells);
    let mut dirty = true;

    loop {
        if viewer.poll(Instant::now()) | redraw.take() {
            dirty = true;
        }

        if dirty {
            let pending = event_mapper.pending_input();
            draw(&mut renderer, &viewer, &display, &cells, pending.as_deref())?;
            dirty = false;
        }

        if event::poll(Duration::from_millis(50))? {
            match event_mapper.map_event(event::read()?) {
                UiEvent::Command(command) => {
                    dirty |= viewer.apply(command);
                }
                UiEvent::Resize { .. } => {
                    cells = CellGeometry::from_window(&terminal::window_size()?);
                    event_mapper.set_cells(cells);
                    capabilities.set_viewport_width(cells.container().width);
                    viewer.resize(cells.container(), Instant::now());
                    dirty = true;
                }
                UiEvent::Quit => break,
                UiEvent::None => {
                    let status = combine_status(
                        Some(format_status(&viewer)),
                        event_mapper.pending_input().as_deref(),
                    );
                    if let Some(status) = status {
                        draw_status_line(&mut renderer, &cells, &status)?;
                    }
                }
            }
        }
    }

    renderer.delete_all()?;
    renderer.clear_all()?;
    info!("viewer closed");
    Ok(ExitCode::SUCCESS)
}

fn open_failure_message(err: &LoadError) -> String {
    format!("unable to open {}: {:#}", err.locator.display(), err.source)
}

fn draw(
    renderer: &mut KittyRenderer<io::Stdout>,
    viewer: &Viewer,
    display: &DisplaySlots,
    cells: &CellGeometry,
    pending_input: Option<&str>,
) -> Result<()> {
    let visible = viewer.visible_pages();
    let mut keep = viewer.scheduler().cached_pages();
    keep.extend_from_slice(&visible);
    display.retain(&keep);

    let placements = layout_spread(
        &visible,
        viewer.display_mode(),
        &viewer.transform(),
        cells,
        |page| display.image(page).map(|image| (image.width, image.height)),
    );

    renderer.begin_sync_update()?;
    renderer.delete_all()?;
    {
        let writer = renderer.writer();
        crossterm::queue!(writer, Clear(ClearType::All))?;
    }
    for placement in &placements {
        match display.image(placement.page) {
            Some(image) => renderer.draw(&image, placement)?,
            None => warn!(page = placement.page, "page image vanished before drawing"),
        }
    }
    if let Some(status) = combine_status(Some(format_status(viewer)), pending_input) {
        draw_status_line(renderer, cells, &status)?;
    }
    renderer.end_sync_update()?;
    Ok(())
}

fn format_status(viewer: &Viewer) -> String {
    let name = viewer
        .info()
        .path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("<unknown>");
    let mut status = name.to_string();
    if let Some(indicator) = viewer.page_indicator() {
        status.push_str(" | ");
        status.push_str(&indicator);
    }
    status.push_str(" | ");
    status.push_str(&viewer.zoom_label());
    if let Some(section) = viewer
        .table_of_contents()
        .section_for(viewer.current_page())
    {
        status.push_str(" | ");
        status.push_str(&section.title);
    }
    status
}

fn combine_status(base: Option<String>, pending_input: Option<&str>) -> Option<String> {
    match (base, pending_input.filter(|s| !s.is_empty())) {
        (Some(mut base), Some(pending)) => {
            base.push_str(" | ");
            base.push_str(pending);
            Some(base)
        }
        (Some(base), None) => Some(base),
        (None, Some(pending)) => Some(pending.to_string()),
        (None, None) => None,
    }
}

fn draw_status_line(
    renderer: &mut KittyRenderer<io::Stdout>,
    cells: &CellGeometry,
    status: &str,
) -> Result<()> {
    let width = usize::from(cells.columns);
    let status: String = status.chars().take(width).collect();
    let writer = renderer.writer();
    crossterm::queue!(
        writer,
        cursor::MoveTo(0, cells.status_row()),
        Clear(ClearType::CurrentLine)
    )?;
    write_status_line(writer, &status)?;
    writer.flush()?;
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "flipbook.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // The terminal belongs to the page images, so logs only go to the file.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

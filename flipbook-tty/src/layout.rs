use crossterm::terminal::WindowSize;
use flipbook_core::{DisplayMode, PageIndex, Point, Size, ViewTransform};

/// Terminal grid and the pixel size of one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellGeometry {
    pub columns: u16,
    pub rows: u16,
    pub cell_width: f32,
    pub cell_height: f32,
}

impl Default for CellGeometry {
    fn default() -> Self {
        Self::new(80, 24, 0, 0)
    }
}

impl CellGeometry {
    /// Used when the terminal does not report its pixel size.
    pub const FALLBACK_CELL: (f32, f32) = (8.0, 16.0);

    pub fn new(columns: u16, rows: u16, pixel_width: u16, pixel_height: u16) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        let cell_width = if pixel_width > 0 {
            f32::from(pixel_width) / f32::from(columns)
        } else {
            Self::FALLBACK_CELL.0
        };
        let cell_height = if pixel_height > 0 {
            f32::from(pixel_height) / f32::from(rows)
        } else {
            Self::FALLBACK_CELL.1
        };
        Self {
            columns,
            rows,
            cell_width,
            cell_height,
        }
    }

    pub fn from_window(window: &WindowSize) -> Self {
        Self::new(window.columns, window.rows, window.width, window.height)
    }

    /// Rows available to pages; the last row holds the status line.
    pub fn page_rows(&self) -> u16 {
        self.rows.saturating_sub(1).max(1)
    }

    pub fn status_row(&self) -> u16 {
        self.rows.saturating_sub(1)
    }

    /// Pixel area the pages are laid out in.
    pub fn container(&self) -> Size {
        Size::new(
            f32::from(self.columns) * self.cell_width,
            f32::from(self.page_rows()) * self.cell_height,
        )
    }

    pub fn cell_centre(&self, column: u16, row: u16) -> Point {
        Point::new(
            (f32::from(column) + 0.5) * self.cell_width,
            (f32::from(row) + 0.5) * self.cell_height,
        )
    }
}

/// Source rectangle within a rendered image, in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Where and how much of a page image to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub page: PageIndex,
    pub column: u16,
    pub row: u16,
    pub columns: u32,
    pub rows: u32,
    pub crop: CropRect,
}

/// Leaf position of each page in the frame. In a double spread even pages sit on the left and
/// odd pages on the right, so the cover and a trailing odd page keep their side.
pub fn leaf_slots(pages: &[PageIndex], mode: DisplayMode) -> Vec<(PageIndex, u32)> {
    match mode {
        DisplayMode::Single => pages.iter().take(1).map(|&page| (page, 0)).collect(),
        DisplayMode::Double => pages
            .iter()
            .take(2)
            .map(|&page| (page, if page % 2 == 0 { 0 } else { 1 }))
            .collect(),
    }
}

/// Clips one leaf of the transformed frame to the page area and snaps it to whole cells.
pub fn place_leaf(
    page: PageIndex,
    slot: u32,
    mode: DisplayMode,
    transform: &ViewTransform,
    image_size: (u32, u32),
    cells: &CellGeometry,
) -> Option<Placement> {
    let (image_width, image_height) = image_size;
    if image_width == 0 || image_height == 0 {
        return None;
    }
    let leaf_width = transform.base.width / mode.pages_across() as f32;
    let top_left = transform.content_to_client(Point::new(slot as f32 * leaf_width, 0.0));
    let bottom_right = transform.content_to_client(Point::new(
        (slot + 1) as f32 * leaf_width,
        transform.base.height,
    ));
    let client_width = bottom_right.x - top_left.x;
    let client_height = bottom_right.y - top_left.y;
    if !(client_width > 0.0 && client_height > 0.0) {
        return None;
    }

    let container = cells.container();
    let first_column = (top_left.x.max(0.0) / cells.cell_width).round();
    let last_column = (bottom_right.x.min(container.width) / cells.cell_width).round();
    let first_row = (top_left.y.max(0.0) / cells.cell_height).round();
    let last_row = (bottom_right.y.min(container.height) / cells.cell_height).round();
    if last_column <= first_column || last_row <= first_row {
        return None;
    }

    let visible_x0 = (first_column * cells.cell_width).max(top_left.x);
    let visible_x1 = (last_column * cells.cell_width).min(bottom_right.x);
    let visible_y0 = (first_row * cells.cell_height).max(top_left.y);
    let visible_y1 = (last_row * cells.cell_height).min(bottom_right.y);

    let scale_x = image_width as f32 / client_width;
    let scale_y = image_height as f32 / client_height;
    let crop_x = (((visible_x0 - top_left.x) * scale_x).round() as u32).min(image_width - 1);
    let crop_y = (((visible_y0 - top_left.y) * scale_y).round() as u32).min(image_height - 1);
    let crop_width = (((visible_x1 - visible_x0) * scale_x).round() as u32)
        .clamp(1, image_width - crop_x);
    let crop_height = (((visible_y1 - visible_y0) * scale_y).round() as u32)
        .clamp(1, image_height - crop_y);

    Some(Placement {
        page,
        column: first_column as u16,
        row: first_row as u16,
        columns: (last_column - first_column) as u32,
        rows: (last_row - first_row) as u32,
        crop: CropRect {
            x: crop_x,
            y: crop_y,
            width: crop_width,
            height: crop_height,
        },
    })
}

/// Placements for every visible page that has an image; `image_size` reports the rendered size.
pub fn layout_spread<F>(
    pages: &[PageIndex],
    mode: DisplayMode,
    transform: &ViewTransform,
    cells: &CellGeometry,
    image_size: F,
) -> Vec<Placement>
where
    F: Fn(PageIndex) -> Option<(u32, u32)>,
{
    leaf_slots(pages, mode)
        .into_iter()
        .filter_map(|(page, slot)| {
            let size = image_size(page)?;
            place_leaf(page, slot, mode, transform, size, cells)
        })
        .collect()
}

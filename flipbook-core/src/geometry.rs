//! Layout and coordinate math. Everything here is a pure function of its arguments.

use serde::{Deserialize, Serialize};

use crate::config::LayoutConfig;
use crate::source::PageSize;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn scaled(self, factor: f32) -> Size {
        Size::new(self.width * factor, self.height * factor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    Single,
    Double,
}

impl DisplayMode {
    pub fn pages_across(self) -> u32 {
        match self {
            DisplayMode::Single => 1,
            DisplayMode::Double => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceClass {
    pub fn classify(viewport_width: f32, layout: &LayoutConfig) -> Self {
        if viewport_width <= layout.mobile_max_width {
            DeviceClass::Mobile
        } else if viewport_width <= layout.tablet_max_width {
            DeviceClass::Tablet
        } else {
            DeviceClass::Desktop
        }
    }
}

/// Size of the page frame at zoom 1 and the display mode it was computed for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseSize {
    pub width: f32,
    pub height: f32,
    pub display_mode: DisplayMode,
}

impl BaseSize {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn leaf_width(&self) -> f32 {
        self.width / self.display_mode.pages_across() as f32
    }
}

fn leaf_for(container: Size, page_ratio: f32, pages_across: u32) -> (f32, f32) {
    let mut leaf_width = container.width / pages_across as f32;
    let mut height = leaf_width / page_ratio;
    if height > container.height {
        height = container.height;
        leaf_width = height * page_ratio;
    }
    (leaf_width, height)
}

/// Fits one or two pages of `page_ratio` into the container without stretching.
pub fn compute_base_size(
    container: Size,
    page_ratio: f32,
    device: DeviceClass,
    layout: &LayoutConfig,
) -> BaseSize {
    let container = Size::new(
        sanitize(container.width).max(layout.min_container),
        sanitize(container.height).max(layout.min_container),
    );
    let page_ratio = if page_ratio.is_finite() && page_ratio > 0.0 {
        page_ratio
    } else {
        layout.default_page_ratio
    };

    let (mut leaf_width, mut height) = leaf_for(container, page_ratio, 2);
    let force_single = match device {
        DeviceClass::Mobile => true,
        DeviceClass::Tablet => leaf_width < layout.tablet_leaf_threshold,
        DeviceClass::Desktop => leaf_width < layout.desktop_leaf_threshold,
    };
    let display_mode = if force_single {
        (leaf_width, height) = leaf_for(container, page_ratio, 1);
        DisplayMode::Single
    } else {
        DisplayMode::Double
    };

    BaseSize {
        width: leaf_width * display_mode.pages_across() as f32,
        height,
        display_mode,
    }
}

fn sanitize(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Zoom and pan applied to a frame of `base` size, positioned at `frame_origin` in client space.
///
/// Display maps a content point `c` to `origin + auto + pan + c * zoom` where
/// `auto = base * (1 - zoom) / 2` keeps the zoomed content centred in the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub frame_origin: Point,
    pub base: Size,
    pub zoom: f32,
    pub pan: Point,
}

impl ViewTransform {
    /// Translation applied before scaling, relative to the frame origin.
    pub fn translation(&self) -> Point {
        Point::new(
            self.base.width * (1.0 - self.zoom) / 2.0 + self.pan.x,
            self.base.height * (1.0 - self.zoom) / 2.0 + self.pan.y,
        )
    }

    pub fn client_to_content(&self, client: Point) -> Point {
        let offset = self.translation();
        Point::new(
            (client.x - self.frame_origin.x - offset.x) / self.zoom,
            (client.y - self.frame_origin.y - offset.y) / self.zoom,
        )
    }

    pub fn content_to_client(&self, content: Point) -> Point {
        let offset = self.translation();
        Point::new(
            self.frame_origin.x + offset.x + content.x * self.zoom,
            self.frame_origin.y + offset.y + content.y * self.zoom,
        )
    }
}

/// Resolution inputs for rasterization: the zoomed frame, how many pages share it, and pixel density.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTarget {
    pub frame: Size,
    pub display_mode: DisplayMode,
    pub device_pixel_ratio: f32,
}

impl RenderTarget {
    pub fn leaf_size(&self) -> Size {
        Size::new(
            self.frame.width / self.display_mode.pages_across() as f32,
            self.frame.height,
        )
    }

    /// Scale that fits `page` into one leaf, multiplied by the pixel density.
    pub fn raster_scale(&self, page: PageSize) -> f32 {
        let leaf = self.leaf_size();
        let fit = (leaf.width / page.width).min(leaf.height / page.height);
        let scale = fit * self.device_pixel_ratio;
        if scale.is_finite() && scale > 0.0 {
            scale
        } else {
            1.0
        }
    }
}

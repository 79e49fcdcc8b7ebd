use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::{LayoutConfig, ViewerConfig, ZoomConfig};
use crate::geometry::{
    compute_base_size, BaseSize, DeviceClass, DisplayMode, Point, RenderTarget, Size,
    ViewTransform,
};
use crate::source::DisplayCapabilities;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewportEvent {
    /// Zoom or pan moved the content; only the visual transform needs refreshing.
    TransformChanged(ViewTransform),
    DisplayModeChanged(DisplayMode),
    /// Effective raster resolution changed; rendered pages are stale.
    ResolutionChanged(RenderTarget),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    PointerDown { id: u64, at: Point },
    PointerMove { id: u64, at: Point },
    PointerUp { id: u64 },
    Wheel {
        at: Point,
        delta: Point,
        zoom_modifier: bool,
    },
}

/// Coalesces bursts of resize notifications into one layout pass.
#[derive(Debug)]
pub struct ResizeDebounce {
    delay: Duration,
    pending: Option<(Size, Instant)>,
}

impl ResizeDebounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn note(&mut self, size: Size, now: Instant) {
        self.pending = Some((size, now));
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Yields the latest size once `delay` has passed since the last notification.
    pub fn poll(&mut self, now: Instant) -> Option<Size> {
        match self.pending {
            Some((size, at)) if now.saturating_duration_since(at) >= self.delay => {
                self.pending = None;
                Some(size)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DragStart {
    pointer: Point,
    pan: Point,
}

#[derive(Debug, Clone, Copy)]
struct PinchStart {
    distance: f32,
    zoom: f32,
}

#[derive(Debug, Default)]
struct PointerTracker {
    active: Vec<(u64, Point)>,
    drag: Option<DragStart>,
    pinch: Option<PinchStart>,
}

impl PointerTracker {
    fn update(&mut self, id: u64, at: Point) -> bool {
        match self.active.iter_mut().find(|(pointer, _)| *pointer == id) {
            Some(entry) => {
                entry.1 = at;
                true
            }
            None => false,
        }
    }

    fn pair(&self) -> Option<(Point, Point)> {
        match self.active.as_slice() {
            [(_, first), (_, second)] => Some((*first, *second)),
            _ => None,
        }
    }
}

/// Owns zoom, pan and layout state and turns input into [`ViewportEvent`]s.
pub struct ViewportController {
    zoom_config: ZoomConfig,
    layout: LayoutConfig,
    capabilities: Arc<dyn DisplayCapabilities>,
    page_ratio: f32,
    container: Size,
    base: BaseSize,
    zoom: f32,
    pan: Point,
    pointers: PointerTracker,
    resize: ResizeDebounce,
    events: Vec<ViewportEvent>,
}

impl ViewportController {
    pub fn new(
        config: &ViewerConfig,
        capabilities: Arc<dyn DisplayCapabilities>,
        container: Size,
        page_ratio: f32,
    ) -> Self {
        let device = DeviceClass::classify(capabilities.viewport_width(), &config.layout);
        let base = compute_base_size(container, page_ratio, device, &config.layout);
        Self {
            zoom_config: config.zoom.clone(),
            layout: config.layout.clone(),
            capabilities,
            page_ratio,
            container,
            base,
            zoom: 1.0,
            pan: Point::default(),
            pointers: PointerTracker::default(),
            resize: ResizeDebounce::new(config.resize_debounce()),
            events: Vec::new(),
        }
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn pan_offset(&self) -> Point {
        self.pan
    }

    pub fn base_size(&self) -> BaseSize {
        self.base
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.base.display_mode
    }

    pub fn container(&self) -> Size {
        self.container
    }

    pub fn zoom_label(&self) -> String {
        format!("{}%", (self.zoom * 100.0).round() as i32)
    }

    /// Top-left of the frame, centred in the container.
    pub fn frame_origin(&self) -> Point {
        Point::new(
            (self.container.width - self.base.width) / 2.0,
            (self.container.height - self.base.height) / 2.0,
        )
    }

    fn frame_centre(&self) -> Point {
        let origin = self.frame_origin();
        Point::new(
            origin.x + self.base.width / 2.0,
            origin.y + self.base.height / 2.0,
        )
    }

    pub fn transform(&self) -> ViewTransform {
        ViewTransform {
            frame_origin: self.frame_origin(),
            base: self.base.size(),
            zoom: self.zoom,
            pan: self.pan,
        }
    }

    pub fn render_target(&self) -> RenderTarget {
        RenderTarget {
            frame: self.base.size().scaled(self.zoom),
            display_mode: self.base.display_mode,
            device_pixel_ratio: self.capabilities.device_pixel_ratio(),
        }
    }

    pub fn client_to_content(&self, client: Point) -> Point {
        self.transform().client_to_content(client)
    }

    pub fn drain_events(&mut self) -> Vec<ViewportEvent> {
        std::mem::take(&mut self.events)
    }

    /// Recomputes the base size; `previous` is the render target before the caller's change.
    fn relayout(&mut self, previous: RenderTarget) {
        let device = DeviceClass::classify(self.capabilities.viewport_width(), &self.layout);
        let base = compute_base_size(self.container, self.page_ratio, device, &self.layout);
        if base.display_mode != self.base.display_mode {
            debug!(mode = ?base.display_mode, "display mode switched");
            self.events
                .push(ViewportEvent::DisplayModeChanged(base.display_mode));
        }
        self.base = base;
        let target = self.render_target();
        if target != previous {
            self.events.push(ViewportEvent::ResolutionChanged(target));
        }
    }

    fn transform_changed(&mut self) {
        let transform = self.transform();
        self.events.push(ViewportEvent::TransformChanged(transform));
    }

    /// Zooms so the content under `focus` (frame centre by default) stays where it is.
    /// Returns `false` when the clamped change is below the configured epsilon.
    pub fn set_zoom(&mut self, target: f32, focus: Option<Point>) -> bool {
        if !target.is_finite() {
            return false;
        }
        let clamped = target.clamp(self.zoom_config.min, self.zoom_config.max);
        if (clamped - self.zoom).abs() < self.zoom_config.epsilon {
            return false;
        }
        let focus = focus.unwrap_or_else(|| self.frame_centre());
        let before = self.client_to_content(focus);
        let previous = self.render_target();

        self.zoom = clamped;
        self.relayout(previous);

        let after = self.client_to_content(focus);
        self.pan.x += (after.x - before.x) * clamped;
        self.pan.y += (after.y - before.y) * clamped;
        self.transform_changed();
        true
    }

    pub fn zoom_in(&mut self, focus: Option<Point>) -> bool {
        self.set_zoom(self.zoom + self.zoom_config.step, focus)
    }

    pub fn zoom_out(&mut self, focus: Option<Point>) -> bool {
        self.set_zoom(self.zoom - self.zoom_config.step, focus)
    }

    /// Back to zoom 1 with the frame re-centred.
    pub fn reset_zoom(&mut self) -> bool {
        let unchanged = self.zoom == 1.0 && self.pan == Point::default();
        if unchanged {
            return false;
        }
        let previous = self.render_target();
        self.zoom = 1.0;
        self.pan = Point::default();
        self.relayout(previous);
        self.transform_changed();
        true
    }

    /// Pure visual translation; never affects raster resolution.
    pub fn pan_by(&mut self, delta_x: f32, delta_y: f32) {
        self.pan.x += delta_x;
        self.pan.y += delta_y;
        self.transform_changed();
    }

    pub fn set_page_ratio(&mut self, page_ratio: f32) {
        let previous = self.render_target();
        self.page_ratio = page_ratio;
        self.relayout(previous);
        self.transform_changed();
    }

    /// Records a container size change; the layout follows once the debounce window passes.
    pub fn note_resize(&mut self, container: Size, now: Instant) {
        self.resize.note(container, now);
    }

    pub fn poll_resize(&mut self, now: Instant) -> bool {
        match self.resize.poll(now) {
            Some(container) => {
                self.resize_now(container);
                true
            }
            None => false,
        }
    }

    pub fn resize_now(&mut self, container: Size) {
        let previous = self.render_target();
        self.container = container;
        self.relayout(previous);
        self.transform_changed();
    }

    pub fn handle_gesture(&mut self, gesture: Gesture) -> bool {
        match gesture {
            Gesture::PointerDown { id, at } => {
                if self.pointers.update(id, at) || self.pointers.active.len() >= 2 {
                    return false;
                }
                self.pointers.active.push((id, at));
                if let Some((first, second)) = self.pointers.pair() {
                    self.pointers.drag = None;
                    self.pointers.pinch = Some(PinchStart {
                        distance: first.distance(second),
                        zoom: self.zoom,
                    });
                } else {
                    self.pointers.drag = Some(DragStart {
                        pointer: at,
                        pan: self.pan,
                    });
                }
                false
            }
            Gesture::PointerMove { id, at } => {
                if !self.pointers.update(id, at) {
                    return false;
                }
                if let (Some(pinch), Some((first, second))) =
                    (self.pointers.pinch, self.pointers.pair())
                {
                    if pinch.distance <= 0.0 {
                        return false;
                    }
                    let factor = first.distance(second) / pinch.distance;
                    return self.set_zoom(pinch.zoom * factor, Some(first.midpoint(second)));
                }
                if let Some(drag) = self.pointers.drag {
                    self.pan = Point::new(
                        drag.pan.x + at.x - drag.pointer.x,
                        drag.pan.y + at.y - drag.pointer.y,
                    );
                    self.transform_changed();
                    return true;
                }
                false
            }
            Gesture::PointerUp { id } => {
                self.pointers.active.retain(|(pointer, _)| *pointer != id);
                self.pointers.drag = None;
                self.pointers.pinch = None;
                false
            }
            Gesture::Wheel {
                at,
                delta,
                zoom_modifier: true,
            } => {
                if delta.y < 0.0 {
                    self.zoom_in(Some(at))
                } else {
                    self.zoom_out(Some(at))
                }
            }
            Gesture::Wheel { delta, .. } => {
                self.pan_by(-delta.x, -delta.y);
                true
            }
        }
    }
}

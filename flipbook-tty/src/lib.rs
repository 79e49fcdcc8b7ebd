use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind},
    terminal::{Clear, ClearType},
};
use flipbook_core::{Command, Gesture, Point, RenderedImage};

pub mod layout;
pub mod surface;

pub use layout::{layout_spread, CellGeometry, CropRect, Placement};
pub use surface::{DisplaySlots, RedrawFlag, TerminalCapabilities, TerminalFlip};

/// Draws page images with the kitty graphics protocol.
pub struct KittyRenderer<W: Write> {
    writer: W,
    placement_id: u32,
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Transmits `image` and shows the `placement.crop` part of it over the placement's cells.
    pub fn draw(&mut self, image: &RenderedImage, placement: &Placement) -> Result<()> {
        crossterm::queue!(
            &mut self.writer,
            cursor::MoveTo(placement.column, placement.row)
        )?;

        let image_id = u32::try_from(placement.page).unwrap_or(u32::MAX).max(1);
        let encoded = BASE64.encode(&image.png);
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = chunks.peek().is_some();
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},x={},y={},w={},h={},c={},r={},z=-1,m={}",
                    image_id,
                    self.placement_id,
                    placement.crop.x,
                    placement.crop.y,
                    placement.crop.width,
                    placement.crop.height,
                    placement.columns.max(1),
                    placement.rows.max(1),
                    if more { 1 } else { 0 }
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", if more { 1 } else { 0 })?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Removes every image placement from the screen.
    pub fn delete_all(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=A,q=2\u{1b}\\")?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Disables synchronized updates.
    /// The terminal will render all buffered changes at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Clears the entire screen.
    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    Command(Command),
    Resize { columns: u16, rows: u16 },
    Quit,
    None,
}

/// Turns terminal input into viewer commands, keeping a numeric prefix between key presses.
#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    cells: CellGeometry,
}

impl EventMapper {
    pub const PAN_STEP: f32 = 40.0;
    pub const WHEEL_STEP: f32 = 48.0;
    const MOUSE_POINTER: u64 = 0;

    pub fn new() -> Self {
        Self::default()
    }

    /// Cell size used to convert mouse positions into pixels.
    pub fn set_cells(&mut self, cells: CellGeometry) {
        self.cells = cells;
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(key) => self.map_key(key),
            Event::Mouse(mouse) => self.map_mouse(mouse),
            Event::Resize(columns, rows) => UiEvent::Resize { columns, rows },
            _ => UiEvent::None,
        }
    }

    fn map_key(&mut self, KeyEvent { code, modifiers, .. }: KeyEvent) -> UiEvent {
        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Left, modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.pan(Self::PAN_STEP, 0.0)
            }
            (KeyCode::Right, modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.pan(-Self::PAN_STEP, 0.0)
            }
            (KeyCode::Up, modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.pan(0.0, Self::PAN_STEP)
            }
            (KeyCode::Down, modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.pan(0.0, -Self::PAN_STEP)
            }
            (KeyCode::Char('H'), KeyModifiers::SHIFT) | (KeyCode::Char('h'), KeyModifiers::NONE) => {
                self.pan(Self::PAN_STEP, 0.0)
            }
            (KeyCode::Char('L'), KeyModifiers::SHIFT) | (KeyCode::Char('l'), KeyModifiers::NONE) => {
                self.pan(-Self::PAN_STEP, 0.0)
            }
            (KeyCode::Char('K'), KeyModifiers::SHIFT) => self.pan(0.0, Self::PAN_STEP),
            (KeyCode::Char('J'), KeyModifiers::SHIFT) => self.pan(0.0, -Self::PAN_STEP),
            (KeyCode::Char('j'), KeyModifiers::NONE)
            | (KeyCode::Char(' '), KeyModifiers::NONE)
            | (KeyCode::Right, KeyModifiers::NONE)
            | (KeyCode::Down, KeyModifiers::NONE)
            | (KeyCode::PageDown, _) => self.command(Command::NextPage),
            (KeyCode::Char('k'), KeyModifiers::NONE)
            | (KeyCode::Left, KeyModifiers::NONE)
            | (KeyCode::Up, KeyModifiers::NONE)
            | (KeyCode::PageUp, _) => self.command(Command::PrevPage),
            (KeyCode::Char('g'), KeyModifiers::NONE) => {
                let page = self.take_count();
                UiEvent::Command(Command::GotoPage { page })
            }
            (KeyCode::Home, _) => self.command(Command::GotoPage { page: 1 }),
            (KeyCode::Char('G'), KeyModifiers::SHIFT) | (KeyCode::End, _) => {
                match self.pending_count.take().filter(|&count| count > 0) {
                    Some(page) => {
                        self.reset_count();
                        UiEvent::Command(Command::GotoPage { page })
                    }
                    None => self.command(Command::LastPage),
                }
            }
            (KeyCode::Char(']'), _) => self.command(Command::NextSection),
            (KeyCode::Char('['), _) => self.command(Command::PrevSection),
            (KeyCode::Char('+'), _) => self.command(Command::ZoomIn { focus: None }),
            (KeyCode::Char('-'), _) => self.command(Command::ZoomOut { focus: None }),
            (KeyCode::Char('='), _) | (KeyCode::Char('z'), KeyModifiers::NONE) => {
                self.command(Command::ResetZoom)
            }
            (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => {
                self.reset_count();
                UiEvent::Quit
            }
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.reset_count();
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_mouse(&mut self, mouse: MouseEvent) -> UiEvent {
        let at = self.cells.cell_centre(mouse.column, mouse.row);
        let zoom_modifier = mouse.modifiers.contains(KeyModifiers::CONTROL);
        let gesture = match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => Gesture::PointerDown {
                id: Self::MOUSE_POINTER,
                at,
            },
            MouseEventKind::Drag(MouseButton::Left) => Gesture::PointerMove {
                id: Self::MOUSE_POINTER,
                at,
            },
            MouseEventKind::Up(MouseButton::Left) => Gesture::PointerUp {
                id: Self::MOUSE_POINTER,
            },
            MouseEventKind::ScrollUp => Gesture::Wheel {
                at,
                delta: Point::new(0.0, -Self::WHEEL_STEP),
                zoom_modifier,
            },
            MouseEventKind::ScrollDown => Gesture::Wheel {
                at,
                delta: Point::new(0.0, Self::WHEEL_STEP),
                zoom_modifier,
            },
            _ => return UiEvent::None,
        };
        UiEvent::Command(Command::Gesture(gesture))
    }

    fn command(&mut self, command: Command) -> UiEvent {
        self.reset_count();
        UiEvent::Command(command)
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    fn pan(&mut self, delta_x: f32, delta_y: f32) -> UiEvent {
        let multiplier = self.take_count() as f32;
        UiEvent::Command(Command::AdjustViewport {
            delta_x: delta_x * multiplier,
            delta_y: delta_y * multiplier,
        })
    }

    pub fn pending_input(&self) -> Option<String> {
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crossterm::event::{KeyEventKind, KeyEventState};

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn mouse_event(kind: MouseEventKind, column: u16, row: u16, modifiers: KeyModifiers) -> Event {
        Event::Mouse(MouseEvent {
            kind,
            column,
            row,
            modifiers,
        })
    }

    #[test]
    fn kitty_draw_emits_cropped_placement() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let image = RenderedImage {
            width: 10,
            height: 20,
            png: Bytes::from_static(b"\x89PNG"),
        };
        let placement = Placement {
            page: 7,
            column: 3,
            row: 1,
            columns: 12,
            rows: 9,
            crop: CropRect {
                x: 2,
                y: 4,
                width: 6,
                height: 10,
            },
        };

        renderer.draw(&image, &placement).unwrap();
        let output = String::from_utf8(renderer.writer).unwrap();
        let command = output.find("\u{1b}_G").unwrap();
        assert!(output[..command].contains("\u{1b}[2;4H"));
        assert!(output[command..].starts_with(
            "\u{1b}_Ga=T,f=100,C=1,q=2,i=7,p=1,x=2,y=4,w=6,h=10,c=12,r=9,z=-1,m=0;"
        ));
        assert!(output.ends_with("\u{1b}\\"));
    }

    #[test]
    fn numeric_prefix_selects_goto_page() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('1'))),
            UiEvent::None
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('2'))),
            UiEvent::None
        ));
        assert_eq!(mapper.pending_input().as_deref(), Some("12"));

        match mapper.map_event(key_event(KeyCode::Char('g'))) {
            UiEvent::Command(Command::GotoPage { page }) => assert_eq!(page, 12),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(mapper.pending_input().is_none());

        match mapper.map_event(key_event(KeyCode::Char('g'))) {
            UiEvent::Command(Command::GotoPage { page }) => assert_eq!(page, 1),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn uppercase_g_goes_to_last_page_without_prefix() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('G'),
                KeyModifiers::SHIFT
            )),
            UiEvent::Command(Command::LastPage)
        ));

        mapper.map_event(key_event(KeyCode::Char('4')));
        match mapper.map_event(key_event_with_modifiers(
            KeyCode::Char('G'),
            KeyModifiers::SHIFT,
        )) {
            UiEvent::Command(Command::GotoPage { page }) => assert_eq!(page, 4),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn prefix_is_dropped_by_other_commands() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('4')));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::Command(Command::NextPage)
        ));
        match mapper.map_event(key_event(KeyCode::Char('g'))) {
            UiEvent::Command(Command::GotoPage { page }) => assert_eq!(page, 1),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn page_and_section_keys() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Right)),
            UiEvent::Command(Command::NextPage)
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('k'))),
            UiEvent::Command(Command::PrevPage)
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char(']'))),
            UiEvent::Command(Command::NextSection)
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('['))),
            UiEvent::Command(Command::PrevSection)
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('q'))),
            UiEvent::Quit
        ));
    }

    #[test]
    fn zoom_keys() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('+'))),
            UiEvent::Command(Command::ZoomIn { focus: None })
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('-'))),
            UiEvent::Command(Command::ZoomOut { focus: None })
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('='))),
            UiEvent::Command(Command::ResetZoom)
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('z'))),
            UiEvent::Command(Command::ResetZoom)
        ));
    }

    #[test]
    fn ctrl_arrows_move_the_view() {
        let mut mapper = EventMapper::new();

        match mapper.map_event(key_event_with_modifiers(
            KeyCode::Right,
            KeyModifiers::CONTROL,
        )) {
            UiEvent::Command(Command::AdjustViewport { delta_x, delta_y }) => {
                assert!((delta_x + EventMapper::PAN_STEP).abs() < f32::EPSILON);
                assert_eq!(delta_y, 0.0);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        match mapper.map_event(key_event_with_modifiers(KeyCode::Up, KeyModifiers::CONTROL)) {
            UiEvent::Command(Command::AdjustViewport { delta_x, delta_y }) => {
                assert_eq!(delta_x, 0.0);
                assert!((delta_y - EventMapper::PAN_STEP).abs() < f32::EPSILON);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn numeric_prefix_scales_pan_distance() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('3')));
        match mapper.map_event(key_event_with_modifiers(
            KeyCode::Char('J'),
            KeyModifiers::SHIFT,
        )) {
            UiEvent::Command(Command::AdjustViewport { delta_x, delta_y }) => {
                assert_eq!(delta_x, 0.0);
                assert!((delta_y + 3.0 * EventMapper::PAN_STEP).abs() < f32::EPSILON);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn mouse_drag_becomes_pointer_gestures() {
        let mut mapper = EventMapper::new();
        mapper.set_cells(CellGeometry::new(100, 40, 1000, 800));

        match mapper.map_event(mouse_event(
            MouseEventKind::Down(MouseButton::Left),
            10,
            5,
            KeyModifiers::NONE,
        )) {
            UiEvent::Command(Command::Gesture(Gesture::PointerDown { at, .. })) => {
                assert_eq!(at, Point::new(105.0, 110.0));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            mapper.map_event(mouse_event(
                MouseEventKind::Drag(MouseButton::Left),
                12,
                5,
                KeyModifiers::NONE
            )),
            UiEvent::Command(Command::Gesture(Gesture::PointerMove { .. }))
        ));
        assert!(matches!(
            mapper.map_event(mouse_event(
                MouseEventKind::Up(MouseButton::Left),
                12,
                5,
                KeyModifiers::NONE
            )),
            UiEvent::Command(Command::Gesture(Gesture::PointerUp { .. }))
        ));
        assert!(matches!(
            mapper.map_event(mouse_event(
                MouseEventKind::Moved,
                1,
                1,
                KeyModifiers::NONE
            )),
            UiEvent::None
        ));
    }

    #[test]
    fn ctrl_scroll_zooms_at_pointer() {
        let mut mapper = EventMapper::new();
        match mapper.map_event(mouse_event(
            MouseEventKind::ScrollUp,
            0,
            0,
            KeyModifiers::CONTROL,
        )) {
            UiEvent::Command(Command::Gesture(Gesture::Wheel {
                at,
                delta,
                zoom_modifier,
            })) => {
                assert!(zoom_modifier);
                assert!(delta.y < 0.0);
                assert_eq!(at, Point::new(4.0, 8.0));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            mapper.map_event(mouse_event(
                MouseEventKind::ScrollDown,
                0,
                0,
                KeyModifiers::NONE
            )),
            UiEvent::Command(Command::Gesture(Gesture::Wheel {
                zoom_modifier: false,
                ..
            }))
        ));
    }

    #[test]
    fn resize_is_forwarded() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(Event::Resize(120, 40)),
            UiEvent::Resize {
                columns: 120,
                rows: 40
            }
        ));
    }
}

use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, KeyboardEnhancementFlags, MouseButton, MouseEvent, MouseEventKind,
        PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{
        EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
        supports_keyboard_enhancement,
    },
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use std::{
    io,
    time::{Duration, Instant},
};

use super::canvas::{CanvasView, GridLabels, to_color};
use crate::config::{ControlsSlot, PadConfig};
use crate::pad::{Pad, PadEvent};
use crate::touch::{MOUSE_TOUCH_ID, TouchPoint};
use crate::trigger::SurfaceRect;

/// Approximate pixel size of one terminal cell, used to size the canvas.
const CELL_PIXELS: (u32, u32) = (8, 16);
const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const DRAW_INTERVAL: Duration = Duration::from_millis(33);
const STATUS_TIMEOUT: Duration = Duration::from_secs(4);
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Download,
    Hold,
    Record,
}

/// Label for the hold button. The header slot has less room for a verb.
pub fn hold_label(slot: ControlsSlot, holding: bool) -> &'static str {
    match (slot, holding) {
        (_, false) => "Hold",
        (ControlsSlot::Header, true) => "Holding",
        (ControlsSlot::Inline, true) => "Hold on",
    }
}

pub fn record_label(recording: bool) -> &'static str {
    if recording { "Stop" } else { "Rec" }
}

/// Map a terminal cell to the point at its center.
fn cell_point(column: u16, row: u16) -> TouchPoint {
    TouchPoint::new(MOUSE_TOUCH_ID, column as f32 + 0.5, row as f32 + 0.5)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pointer {
    Up,
    /// Down on the pad surface.
    Touching,
    /// Down on a control; the rest of the gesture is ignored.
    Pressing,
}

pub struct TerminalUI {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    pad: Pad,
    keyboard_enhanced: bool,
    is_running: bool,
    last_frame: Instant,
    last_draw: Instant,
    pointer: Pointer,
    buttons: Vec<(Rect, Control)>,
    failed_assets: Vec<String>,
    status: Option<(String, Instant)>,
}

impl TerminalUI {
    /// Mount the pad and take over the terminal.
    pub fn new(config: PadConfig) -> anyhow::Result<Self> {
        let keyboard_enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
        let pad = Pad::mount(config, keyboard_enhanced)?;

        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        if keyboard_enhanced {
            execute!(
                stdout,
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
        }

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        let now = Instant::now();

        let mut ui = Self {
            terminal,
            pad,
            keyboard_enhanced,
            is_running: true,
            last_frame: now,
            last_draw: now,
            pointer: Pointer::Up,
            buttons: Vec::new(),
            failed_assets: Vec::new(),
            status: None,
        };
        let size = ui.terminal.size()?;
        ui.resize(size.width, size.height);
        Ok(ui)
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        while self.is_running {
            self.process_events()?;

            let now = Instant::now();
            if now.duration_since(self.last_frame) >= FRAME_INTERVAL {
                self.pad.frame(now);
                self.handle_pad_events();
                self.last_frame = now;
            }

            if now.duration_since(self.last_draw) >= DRAW_INTERVAL {
                self.check_status_timer();
                self.draw()?;
                self.last_draw = now;
            }

            std::thread::sleep(Duration::from_millis(1));
        }

        if self.pad.is_recording()
            && let Some(artifact) = self.pad.finish_recording(FINALIZE_TIMEOUT)
        {
            tracing::info!(path = %artifact.path.display(), "recording saved on exit");
        }
        self.pad.teardown();
        Ok(())
    }

    fn process_events(&mut self) -> anyhow::Result<()> {
        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Key(key) => self.handle_key_event(key),
                Event::Mouse(mouse) => self.handle_mouse_event(mouse),
                Event::Resize(width, height) => self.resize(width, height),
                _ => {}
            }
        }
        Ok(())
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        let now = Instant::now();
        match key.code {
            KeyCode::Esc => self.is_running = false,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.is_running = false
            }
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                if key.kind == KeyEventKind::Press {
                    self.pad.toggle_recording(now);
                }
            }
            KeyCode::Tab if key.kind == KeyEventKind::Press => {
                self.pad.toggle_hold_mode(now);
            }
            KeyCode::Char(c) => match key.kind {
                KeyEventKind::Press | KeyEventKind::Repeat => {
                    self.pad.key_down(c.to_ascii_lowercase(), now)
                }
                KeyEventKind::Release => self.pad.key_up(c.to_ascii_lowercase()),
            },
            _ => {}
        }
    }

    fn handle_mouse_event(&mut self, mouse: MouseEvent) {
        let now = Instant::now();
        let point = cell_point(mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if let Some(control) = self.control_at(mouse.column, mouse.row) {
                    self.pointer = Pointer::Pressing;
                    self.activate_control(control, now);
                } else {
                    self.pointer = Pointer::Touching;
                    self.pad.touch_start(&[point], now);
                }
            }
            MouseEventKind::Drag(MouseButton::Left) if self.pointer == Pointer::Touching => {
                self.pad.touch_move(&[point], now);
            }
            MouseEventKind::Up(MouseButton::Left) => {
                if self.pointer == Pointer::Touching {
                    self.pad.touch_end(&[point], now);
                }
                self.pointer = Pointer::Up;
            }
            _ => {}
        }
    }

    fn control_at(&self, column: u16, row: u16) -> Option<Control> {
        self.buttons
            .iter()
            .find(|(rect, _)| {
                column >= rect.x && column < rect.right() && row >= rect.y && row < rect.bottom()
            })
            .map(|&(_, control)| control)
    }

    fn activate_control(&mut self, control: Control, now: Instant) {
        match control {
            Control::Hold => {
                self.pad.toggle_hold_mode(now);
            }
            Control::Record => self.pad.toggle_recording(now),
            Control::Download => {
                if let Some(artifact) = self.pad.latest_recording() {
                    let message = format!("Saved to {}", artifact.path.display());
                    self.show_status(message);
                }
            }
        }
    }

    fn resize(&mut self, width: u16, height: u16) {
        self.pad.resize_viewport(
            width as u32 * CELL_PIXELS.0,
            height as u32 * CELL_PIXELS.1,
        );
    }

    fn handle_pad_events(&mut self) {
        for event in self.pad.drain_events() {
            match event {
                PadEvent::AssetFailed { id, message, .. } => {
                    self.failed_assets.push(format!("{id}: {message}"));
                }
                PadEvent::RecordingStarted { format, with_audio } => {
                    let audio = if with_audio { "" } else { " (no audio)" };
                    self.show_status(format!("Recording {}{audio}", format.mime_type()));
                }
                PadEvent::RecordingReady(artifact) => {
                    self.show_status(format!("Recording ready: {}", artifact.filename));
                }
                PadEvent::RecordingFailed(message) => {
                    tracing::error!(%message, "recording failed");
                }
                PadEvent::Notice(message) => self.show_status(message),
            }
        }
    }

    fn show_status(&mut self, message: String) {
        self.status = Some((message, Instant::now()));
    }

    fn check_status_timer(&mut self) {
        if let Some((_, shown)) = &self.status
            && shown.elapsed() >= STATUS_TIMEOUT
        {
            self.status = None;
        }
    }

    fn draw(&mut self) -> anyhow::Result<()> {
        let pad = &mut self.pad;
        let buttons = &mut self.buttons;
        let status = self.status.as_ref().map(|(m, _)| m.as_str());
        let failed_assets = &self.failed_assets;
        buttons.clear();

        self.terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),      // Header
                    Constraint::Percentage(75), // Pad
                    Constraint::Min(4),         // Footer
                ])
                .split(f.area());

            Self::draw_header_static(f, chunks[0], pad, status, buttons);
            Self::draw_pad_static(f, chunks[1], pad);
            Self::draw_footer_static(f, chunks[2], pad, failed_assets, buttons);
        })?;
        Ok(())
    }

    fn draw_header_static(
        f: &mut Frame,
        area: Rect,
        pad: &Pad,
        status: Option<&str>,
        buttons: &mut Vec<(Rect, Control)>,
    ) {
        let text = pad.config().style.theme.palette().text;
        let block = Block::default().borders(Borders::ALL).title("DynamicPad");
        let inner = block.inner(area);
        f.render_widget(block, area);

        let header_text = match status {
            Some(message) => format!("✓ {message}"),
            None if pad.is_recording() => format!(
                "● REC {} KB | Output: {}",
                pad.recorded_bytes() / 1024,
                pad.audio_device()
            ),
            None => format!(
                "{} layers | Output: {}",
                pad.layer_count(),
                pad.audio_device()
            ),
        };
        let header = Paragraph::new(header_text)
            .style(Style::default().fg(to_color(text)).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Left);
        f.render_widget(header, inner);

        if pad.config().ui.controls == ControlsSlot::Header {
            Self::draw_controls_static(f, inner, pad, ControlsSlot::Header, buttons);
        }
    }

    fn draw_pad_static(f: &mut Frame, area: Rect, pad: &mut Pad) {
        let border = pad.config().style.theme.palette().border;
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(to_color(border)));
        let inner = block.inner(area);
        f.render_widget(block, area);

        pad.set_surface(SurfaceRect::new(
            inner.x as f32,
            inner.y as f32,
            inner.width as f32,
            inner.height as f32,
        ));
        f.render_widget(CanvasView::new(pad.canvas()), inner);

        let labels: Vec<(String, bool)> = (0..pad.layer_count())
            .map(|layer| {
                let key = pad
                    .key_for_layer(layer)
                    .map(|k| k.to_ascii_uppercase().to_string())
                    .unwrap_or_default();
                let id = pad.layer_id(layer).unwrap_or_default();
                (format!(" {key} {id} "), pad.is_active(layer))
            })
            .collect();
        f.render_widget(
            GridLabels {
                grid: pad.grid(),
                labels: &labels,
                color: to_color(pad.config().style.theme.palette().text),
            },
            inner,
        );
    }

    fn draw_footer_static(
        f: &mut Frame,
        area: Rect,
        pad: &Pad,
        failed_assets: &[String],
        buttons: &mut Vec<(Rect, Control)>,
    ) {
        let key_color = Color::Yellow;
        let desc_color = Color::White;
        let sep_color = Color::DarkGray;

        let key_desc = |key: &str, desc: &str| -> Vec<Span> {
            vec![
                Span::styled(
                    key.to_string(),
                    Style::default().fg(key_color).add_modifier(Modifier::BOLD),
                ),
                Span::styled("=".to_string(), Style::default().fg(sep_color)),
                Span::styled(desc.to_string(), Style::default().fg(desc_color)),
            ]
        };
        let separator = || Span::styled(" | ".to_string(), Style::default().fg(sep_color));

        let mut hint_spans = Vec::new();
        if let Some(text) = pad.style_text() {
            hint_spans.push(Span::styled(
                format!("{text}  "),
                Style::default().fg(desc_color).add_modifier(Modifier::ITALIC),
            ));
        }
        hint_spans.push(Span::styled(
            pad.key_hint_text(),
            Style::default().fg(Color::Cyan),
        ));

        let mut line2_spans = Vec::new();
        line2_spans.extend(key_desc("Tab", "Hold"));
        line2_spans.push(separator());
        line2_spans.extend(key_desc("Ctrl+R", "Record"));
        line2_spans.push(separator());
        line2_spans.extend(key_desc("Esc", "Quit"));

        let mut lines = vec![Line::from(hint_spans), Line::from(line2_spans)];
        if let Some(error) = pad.record_error() {
            lines.push(Line::from(Span::styled(
                error.to_string(),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )));
        }
        if !failed_assets.is_empty() {
            lines.push(Line::from(Span::styled(
                format!("Failed to load: {}", failed_assets.join(", ")),
                Style::default().fg(Color::Red),
            )));
        }

        let block = Block::default().borders(Borders::ALL).title("Controls");
        let inner = block.inner(area);
        f.render_widget(Paragraph::new(lines).block(block), area);

        if pad.config().ui.controls == ControlsSlot::Inline {
            Self::draw_controls_static(f, inner, pad, ControlsSlot::Inline, buttons);
        }
    }

    /// Right-aligned buttons on the first row of `area`.
    fn draw_controls_static(
        f: &mut Frame,
        area: Rect,
        pad: &Pad,
        slot: ControlsSlot,
        buttons: &mut Vec<(Rect, Control)>,
    ) {
        let mut controls = Vec::new();
        if pad.latest_recording().is_some() {
            controls.push((Control::Download, "Download", false));
        }
        controls.push((
            Control::Hold,
            hold_label(slot, pad.hold_mode()),
            pad.hold_mode(),
        ));
        controls.push((
            Control::Record,
            record_label(pad.is_recording()),
            pad.is_recording(),
        ));

        let mut right = area.right();
        for (control, label, lit) in controls.into_iter().rev() {
            let width = label.chars().count() as u16 + 2;
            let Some(x) = right.checked_sub(width) else {
                break;
            };
            if x < area.x {
                break;
            }
            let rect = Rect::new(x, area.y, width, 1);
            let style = if lit {
                Style::default().fg(Color::Black).bg(Color::Red)
            } else {
                Style::default().fg(Color::Black).bg(Color::Gray)
            };
            f.render_widget(
                Paragraph::new(format!(" {label} ")).style(style.add_modifier(Modifier::BOLD)),
                rect,
            );
            buttons.push((rect, control));
            right = x.saturating_sub(1);
        }
    }
}

impl Drop for TerminalUI {
    fn drop(&mut self) {
        self.pad.teardown();
        let _ = disable_raw_mode();
        if self.keyboard_enhanced {
            let _ = execute!(self.terminal.backend_mut(), PopKeyboardEnhancementFlags);
        }
        let _ = execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_label_depends_on_slot() {
        assert_eq!(hold_label(ControlsSlot::Header, true), "Holding");
        assert_eq!(hold_label(ControlsSlot::Inline, true), "Hold on");
        assert_eq!(hold_label(ControlsSlot::Header, false), "Hold");
        assert_eq!(record_label(true), "Stop");
        assert_eq!(record_label(false), "Rec");
    }

    #[test]
    fn mouse_cells_map_to_centers() {
        let point = cell_point(3, 7);
        assert_eq!(point.id, MOUSE_TOUCH_ID);
        assert_eq!((point.x, point.y), (3.5, 7.5));
    }
}

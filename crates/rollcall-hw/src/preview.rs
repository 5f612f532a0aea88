//! ASCII terminal preview.
//!
//! Renders frames as a luma-ramp character grid sized to the terminal,
//! with face overlays drawn as labelled boxes. When stdout is not a
//! terminal the preview degrades to a debug log line per frame and
//! control polling reports nothing.

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute, queue,
    style::Print,
    terminal::{self, disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use rollcall_core::types::BoundingBox;
use rollcall_core::{ControlSignal, FaceOverlay, Frame, Surface};
use std::io::{IsTerminal, Write};
use std::time::Duration;

/// Darkest to brightest.
const LUMA_RAMP: [char; 10] = [' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];

/// Live preview on the controlling terminal.
pub struct TerminalSurface {
    interactive: bool,
    raw_mode: bool,
    hint: String,
}

impl TerminalSurface {
    /// Set up the preview with a key-binding hint shown under the frame.
    pub fn with_hint(hint: &str) -> Self {
        let interactive = std::io::stdout().is_terminal();
        let mut raw_mode = false;

        if interactive {
            match enable_raw_mode() {
                Ok(()) => {
                    raw_mode = true;
                    let _ = execute!(std::io::stdout(), cursor::Hide);
                }
                Err(e) => tracing::warn!("raw mode unavailable, keys may echo: {e}"),
            }
        } else {
            tracing::debug!("stdout is not a terminal, preview disabled");
        }

        Self {
            interactive,
            raw_mode,
            hint: hint.to_string(),
        }
    }

    fn draw(&self, frame: &Frame, overlays: &[FaceOverlay]) -> std::io::Result<()> {
        if frame.width == 0 || frame.height == 0 {
            return Ok(());
        }

        let (cols, rows) = terminal::size()?;
        let cols = (cols.max(2)) as usize;
        // Bottom row is reserved for the hint line.
        let rows = (rows.saturating_sub(1).max(1)) as usize;

        let mut grid = vec![' '; cols * rows];
        for cy in 0..rows {
            let fy = ((cy as u32 * frame.height) / rows as u32).min(frame.height - 1);
            for cx in 0..cols {
                let fx = ((cx as u32 * frame.width) / cols as u32).min(frame.width - 1);
                grid[cy * cols + cx] = ramp_char(frame.luma_at(fx, fy));
            }
        }

        for overlay in overlays {
            paint_overlay(&mut grid, cols, rows, frame, overlay);
        }

        let mut out = std::io::stdout();
        for (y, row) in grid.chunks(cols).enumerate() {
            let line: String = row.iter().collect();
            queue!(
                out,
                cursor::MoveTo(0, y as u16),
                Print(line),
                Clear(ClearType::UntilNewLine)
            )?;
        }
        queue!(
            out,
            cursor::MoveTo(0, rows as u16),
            Print(&self.hint),
            Clear(ClearType::UntilNewLine)
        )?;
        out.flush()
    }
}

impl Surface for TerminalSurface {
    fn present(&mut self, frame: &Frame, overlays: &[FaceOverlay]) {
        if !self.interactive {
            tracing::debug!(
                width = frame.width,
                height = frame.height,
                overlays = overlays.len(),
                "frame presented (no terminal)"
            );
            return;
        }
        if let Err(e) = self.draw(frame, overlays) {
            tracing::debug!("preview draw failed: {e}");
        }
    }

    fn poll_control(&mut self) -> Option<ControlSignal> {
        if !self.interactive {
            return None;
        }

        while event::poll(Duration::ZERO).unwrap_or(false) {
            let Ok(ev) = event::read() else {
                break;
            };
            let Event::Key(key) = ev else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('s') => return Some(ControlSignal::Save),
                KeyCode::Char('q') | KeyCode::Esc => return Some(ControlSignal::Quit),
                // Raw mode swallows SIGINT, so Ctrl-C must be handled here.
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Some(ControlSignal::Quit);
                }
                _ => {}
            }
        }
        None
    }
}

impl Drop for TerminalSurface {
    fn drop(&mut self) {
        if self.raw_mode {
            let _ = disable_raw_mode();
        }
        if self.interactive {
            let _ = execute!(std::io::stdout(), cursor::Show, Print("\r\n"));
        }
    }
}

fn ramp_char(luma: u8) -> char {
    LUMA_RAMP[(luma as usize * (LUMA_RAMP.len() - 1)) / 255]
}

/// Bounding box in cell coordinates, clamped inside the grid.
fn cell_box(
    bbox: &BoundingBox,
    frame_w: u32,
    frame_h: u32,
    cols: usize,
    rows: usize,
) -> (usize, usize, usize, usize) {
    let scale_x = cols as f32 / frame_w as f32;
    let scale_y = rows as f32 / frame_h as f32;

    let clamp_x = |v: f32| (v as isize).clamp(0, cols as isize - 1) as usize;
    let clamp_y = |v: f32| (v as isize).clamp(0, rows as isize - 1) as usize;

    (
        clamp_x(bbox.x * scale_x),
        clamp_y(bbox.y * scale_y),
        clamp_x((bbox.x + bbox.width) * scale_x),
        clamp_y((bbox.y + bbox.height) * scale_y),
    )
}

fn paint_overlay(
    grid: &mut [char],
    cols: usize,
    rows: usize,
    frame: &Frame,
    overlay: &FaceOverlay,
) {
    let (x0, y0, x1, y1) = cell_box(&overlay.bbox, frame.width, frame.height, cols, rows);

    for x in x0..=x1 {
        grid[y0 * cols + x] = '-';
        grid[y1 * cols + x] = '-';
    }
    for y in y0..=y1 {
        grid[y * cols + x0] = '|';
        grid[y * cols + x1] = '|';
    }
    for (x, y) in [(x0, y0), (x1, y0), (x0, y1), (x1, y1)] {
        grid[y * cols + x] = '+';
    }

    // Label along the top edge, truncated at the box's right corner.
    let mut x = x0 + 1;
    for ch in overlay.label.chars() {
        if x >= x1 {
            break;
        }
        grid[y0 * cols + x] = ch;
        x += 1;
    }
}

//! Plain-text renderer for headless deployments and debugging.
//!
//! Draws each [`BoardFrame`] as a block of text, columns side by side and
//! order numbers zero-padded to three digits:
//!
//! ```text
//! ── Küpseb ──
//! 012  088
//! 045
//! 103
//! 007
//! ── Valmis ──
//! 001
//! ```

use std::io::{self, Write};

use orderboard_core::{format_order_number, ColumnLayout};
use tracing::warn;

use crate::application::board::{BoardFrame, Renderer};

/// Separator between columns on the same row.
const COLUMN_GAP: &str = "  ";

/// Writes every frame to a byte sink.
pub struct TextRenderer<W> {
    out: W,
    frames: u64,
}

impl TextRenderer<io::Stdout> {
    /// A renderer writing to standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TextRenderer<W> {
    /// A renderer writing to `out`.
    pub fn new(out: W) -> Self {
        Self { out, frames: 0 }
    }

    /// Frames written successfully.
    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    /// Consumes the renderer and returns its sink.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Renderer for TextRenderer<W> {
    fn render(&mut self, frame: &BoardFrame) {
        let text = render_text(frame);
        let written = self
            .out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush());
        match written {
            Ok(()) => self.frames += 1,
            Err(e) => warn!("failed to draw board frame #{}: {e}", frame.sequence),
        }
    }
}

/// Formats both halves of `frame` as text.
pub fn render_text(frame: &BoardFrame) -> String {
    let mut text = String::new();
    push_section(&mut text, &frame.labels.active, &frame.active);
    push_section(&mut text, &frame.labels.completed, &frame.completed);
    text
}

fn push_section(text: &mut String, title: &str, layout: &ColumnLayout) {
    text.push_str("── ");
    text.push_str(title);
    text.push_str(" ──\n");

    let rows = layout.columns.iter().map(Vec::len).max().unwrap_or(0);
    for row in 0..rows {
        let cells: Vec<String> = layout
            .columns
            .iter()
            .filter_map(|column| column.get(row).copied())
            .map(format_order_number)
            .collect();
        text.push_str(&cells.join(COLUMN_GAP));
        text.push('\n');
    }

    if layout.overflowed {
        text.push_str("(more orders not shown)\n");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

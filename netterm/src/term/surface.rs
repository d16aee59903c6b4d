
use std::borrow::Cow;

use log::trace;
use vte::{Parser, Perform};

pub const CONNECTED_BANNER: &str = "\x1b[32m✓ Connected to device console\x1b[0m\r\n\r\n";
pub const DISCONNECTED_BANNER: &str = "\r\n\x1b[31m✗ Connection closed\x1b[0m\r\n";

pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;

const TAB_WIDTH: u16 = 8;

/// Pixel size of one character cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMetrics {
	pub width: f64,
	pub height: f64,
}
impl Default for CellMetrics {
	fn default() -> CellMetrics {
		// 14px monospace
		CellMetrics { width: 8.4, height: 17.0 }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
	#[default]
	Docked,
	Maximized,
}

/// Where the next printable character lands. Driven by the escape parser, so control and escape
/// sequences never take a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
	row: u16,
	col: u16,
	cols: u16,
	rows: u16,
}
impl Cursor {
	fn line_feed(&mut self) {
		// the bottom row scrolls
		self.row = (self.row + 1).min(self.rows.saturating_sub(1));
	}
}
impl Perform for Cursor {
	fn print(&mut self, _c: char) {
		if self.col >= self.cols {
			self.col = 0;
			self.line_feed();
		}
		self.col += 1;
	}

	fn execute(&mut self, byte: u8) {
		match byte {
			b'\r' => self.col = 0,
			b'\n' | 0x0b | 0x0c => self.line_feed(),
			0x08 => self.col = self.col.saturating_sub(1),
			b'\t' => self.col = ((self.col / TAB_WIDTH + 1) * TAB_WIDTH).min(self.cols.saturating_sub(1)),
			_ => {},
		}
	}
}

/// The rendered side of a console: everything received, in order, plus where the cursor is.
pub struct TerminalSurface {
	transcript: Vec<u8>,
	cursor: Cursor,
	parser: Parser,
	cell: CellMetrics,
	layout: Layout,
	docked_px: Option<(f64, f64)>,
	maximized_px: Option<(f64, f64)>,
	input_attached: bool,
}
impl std::fmt::Debug for TerminalSurface {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TerminalSurface")
			.field("transcript", &self.transcript.len())
			.field("cursor", &self.cursor)
			.field("layout", &self.layout)
			.field("input_attached", &self.input_attached)
			.finish()
	}
}
impl Default for TerminalSurface {
	fn default() -> TerminalSurface {
		TerminalSurface::new()
	}
}

/// Whole cells in `px`. Anything unusable (NaN, infinite, under one cell) counts as one.
fn cells(px: f64, cell: f64) -> u16 {
	let n = (px / cell).floor();
	if !(n >= 1.0) || !n.is_finite() {
		1
	} else {
		n.min(u16::MAX as f64) as u16
	}
}

impl TerminalSurface {
	pub fn new() -> TerminalSurface {
		TerminalSurface::with_metrics(CellMetrics::default())
	}

	pub fn with_metrics(cell: CellMetrics) -> TerminalSurface {
		TerminalSurface {
			transcript: Vec::new(),
			cursor: Cursor { row: 0, col: 0, cols: DEFAULT_COLS, rows: DEFAULT_ROWS },
			parser: Parser::new(),
			cell,
			layout: Layout::Docked,
			docked_px: None,
			maximized_px: None,
			input_attached: false,
		}
	}

	// Getters
	pub fn transcript(&self) -> &[u8] { &self.transcript }
	pub fn text(&self) -> Cow<'_, str> { String::from_utf8_lossy(&self.transcript) }
	/// (row, column), zero based
	pub fn cursor(&self) -> (u16, u16) { (self.cursor.row, self.cursor.col) }
	/// (columns, rows)
	pub fn size(&self) -> (u16, u16) { (self.cursor.cols, self.cursor.rows) }
	pub fn layout(&self) -> Layout { self.layout }
	pub fn accepts_input(&self) -> bool { self.input_attached }

	pub fn attach_input(&mut self) { self.input_attached = true; }
	pub fn detach_input(&mut self) { self.input_attached = false; }

	/// Appends bytes exactly as received.
	pub fn write(&mut self, data: &[u8]) {
		self.transcript.extend_from_slice(data);
		self.parser.advance(&mut self.cursor, data);
	}

	pub fn write_str(&mut self, s: &str) {
		self.write(s.as_bytes());
	}

	/// Recomputes rows and columns for a container of the given pixel size. Returns (columns, rows).
	pub fn fit(&mut self, width_px: f64, height_px: f64) -> (u16, u16) {
		match self.layout {
			Layout::Docked => self.docked_px = Some((width_px, height_px)),
			Layout::Maximized => self.maximized_px = Some((width_px, height_px)),
		}

		let c = &mut self.cursor;
		c.cols = cells(width_px, self.cell.width);
		c.rows = cells(height_px, self.cell.height);
		c.row = c.row.min(c.rows - 1);
		c.col = c.col.min(c.cols);
		trace!("terminal fitted to {}x{} ({}x{} px)", c.cols, c.rows, width_px, height_px);
		(c.cols, c.rows)
	}

	/// Switches between the docked and maximised containers, refitting to the new one if its size is known.
	pub fn toggle_maximize(&mut self) -> Layout {
		self.layout = match self.layout {
			Layout::Docked => Layout::Maximized,
			Layout::Maximized => Layout::Docked,
		};
		let px = match self.layout {
			Layout::Docked => self.docked_px,
			Layout::Maximized => self.maximized_px,
		};
		if let Some((w, h)) = px {
			self.fit(w, h);
		}
		self.layout
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn chunks_concatenate_in_order() {
		let mut s = TerminalSurface::new();
		for chunk in ["a", "bc", "d"] {
			s.write(chunk.as_bytes());
		}
		assert_eq!(s.transcript(), b"abcd");
		assert_eq!(s.cursor(), (0, 4));
	}

	#[test]
	fn cursor_follows_control_bytes() {
		let mut s = TerminalSurface::new();
		s.write(b"abc\x08\x08X\r\n\tY");
		assert_eq!(s.cursor(), (1, 9));

		s.write(b"\r");
		assert_eq!(s.cursor(), (1, 0));
	}

	#[test]
	fn escape_sequences_take_no_cells() {
		let mut s = TerminalSurface::new();
		s.write_str(CONNECTED_BANNER);
		assert_eq!(s.cursor(), (2, 0));

		s.write(b"\x1b]0;title\x07ok\x1b[1;31mred\x1b[0m");
		assert_eq!(s.cursor(), (2, 5));
		assert!(s.text().contains("Connected to device console"));
	}

	#[test]
	fn charset_and_dcs_sequences_take_no_cells() {
		let mut s = TerminalSurface::new();
		// sgr0 as terminfo emits it
		s.write(b"\x1b(Bok");
		assert_eq!(s.cursor(), (0, 2));

		let mut s = TerminalSurface::new();
		s.write(b"\x1bP1$r0m\x1b\\ok");
		assert_eq!(s.cursor(), (0, 2));
		assert_eq!(s.transcript(), b"\x1bP1$r0m\x1b\\ok");
	}

	#[test]
	fn sequences_split_across_chunks() {
		let mut s = TerminalSurface::new();
		let chunks: [&[u8]; 5] = [b"\x1b[", b"1;3", b"1mA", b"\xe2\x9c", b"\x93"];
		for chunk in chunks {
			s.write(chunk);
		}
		assert_eq!(s.cursor(), (0, 2));
	}

	#[test]
	fn long_lines_wrap_and_bottom_row_scrolls() {
		let mut s = TerminalSurface::new();
		s.write(&[b'x'; 81]);
		assert_eq!(s.cursor(), (1, 1));

		s.write(&[b'\n'; 100]);
		assert_eq!(s.cursor(), (DEFAULT_ROWS - 1, 1));
	}

	#[test]
	fn fit_uses_cell_metrics() {
		let mut s = TerminalSurface::with_metrics(CellMetrics { width: 10.0, height: 20.0 });
		assert_eq!(s.size(), (DEFAULT_COLS, DEFAULT_ROWS));
		assert_eq!(s.fit(805.0, 415.0), (80, 20));
		assert_eq!(s.fit(0.0, 0.0), (1, 1));
	}

	#[test]
	fn unusable_sizes_fit_to_one_cell() {
		let mut s = TerminalSurface::new();
		assert_eq!(s.fit(f64::NAN, 170.0), (1, 10));
		s.write(b"\tab\t");
		assert_eq!(s.cursor(), (1, 0));

		let mut s = TerminalSurface::with_metrics(CellMetrics { width: 0.0, height: 0.0 });
		assert_eq!(s.fit(0.0, -5.0), (1, 1));
		s.write(b"x\ty\n");
		assert_eq!(s.cursor(), (0, 1));
	}

	#[test]
	fn maximize_refits_to_the_other_container() {
		let mut s = TerminalSurface::with_metrics(CellMetrics { width: 10.0, height: 20.0 });
		s.fit(600.0, 200.0);
		assert_eq!(s.toggle_maximize(), Layout::Maximized);
		// maximised size not known yet
		assert_eq!(s.size(), (60, 10));

		s.fit(1200.0, 800.0);
		assert_eq!(s.size(), (120, 40));
		assert_eq!(s.toggle_maximize(), Layout::Docked);
		assert_eq!(s.size(), (60, 10));
		assert_eq!(s.toggle_maximize(), Layout::Maximized);
		assert_eq!(s.size(), (120, 40));
	}
}


use std::io::Write;
use std::str::Utf8Error;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use crossterm::terminal;
use crossterm::tty::IsTty;
use futures::channel::mpsc::{self, Receiver, SendError, Sender};
use futures::{SinkExt, StreamExt};
use log::{debug, trace};
use thiserror::Error;

use crate::term::surface::CellMetrics;
use crate::term::SessionState;
use crate::workbench::Workbench;

/// Ctrl-]
pub const DETACH_KEY: u8 = 0x1d;

const RESIZE_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum RawError {
	#[error("A terminal IO error occured.")]
	Io(#[from] std::io::Error),
	#[error("Input queue has closed")]
	Buffer(#[from] SendError),
	#[error("Input was not UTF-8. This is unsupported, and a fatal error.")]
	Encoding(#[from] Utf8Error),
	#[error("Standard input is not a terminal")]
	NotATty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
	Keys(String),
	/// The detach key was pressed
	Detach,
}

/// Splits a chunk of stdin at the detach key. Anything typed before it is still sent.
fn split_input(chunk: &[u8]) -> Result<Vec<Input>, Utf8Error> {
	let (keys, detach) = match chunk.iter().position(|&b| b == DETACH_KEY) {
		Some(i) => (&chunk[..i], true),
		None => (chunk, false),
	};
	let mut out = Vec::with_capacity(2);
	if !keys.is_empty() {
		out.push(Input::Keys(std::str::from_utf8(keys)?.to_owned()));
	}
	if detach {
		out.push(Input::Detach);
	}
	Ok(out)
}

/// Relays the local terminal to one console in raw mode.
///
/// ### Functions:
/// * Keystrokes go to the console verbatim, `Ctrl-]` detaches
/// * Console output is copied to stdout as it lands in the session's surface
/// * The surface is refitted whenever the local terminal is resized
/// * Returns once the console closes, fails, or the user detaches
pub struct RawTerminal {
	cell: CellMetrics,
}

impl RawTerminal {
	pub fn new() -> Result<RawTerminal, RawError> {
		if !std::io::stdin().is_tty() {
			return Err(RawError::NotATty);
		}
		Ok(RawTerminal { cell: CellMetrics::default() })
	}

	pub async fn run(self, wb: &mut Workbench, node: &str) -> anyhow::Result<()> {
		let (to_console, input) = mpsc::channel::<Input>(16);

		terminal::enable_raw_mode().with_context(|| "enabling terminal's raw mode")?;
		// the reader blocks on stdin until the next keypress, so it is left to die with the process
		let _stdin_handler = drive_input(to_console)?;

		let res = self.relay(wb, node, input).await;

		terminal::disable_raw_mode().with_context(|| "disabling terminal's raw mode")?;
		debug!("raw relay for {} finished", node);

		let session = match wb.consoles().session(node) {
			Some(s) => s,
			None => return res,
		};
		match session.state() {
			SessionState::Error => anyhow::bail!("console failed: {}", session.error().unwrap_or("unknown error")),
			_ => res,
		}
	}

	async fn relay(&self, wb: &mut Workbench, node: &str, mut input: Receiver<Input>) -> anyhow::Result<()> {
		let stdout = std::io::stdout();
		let mut written = 0;
		let mut size = None;
		let mut resize = tokio::time::interval(RESIZE_POLL);

		loop {
			tokio::select! {
				ev = wb.next_console_event() => if ev.is_none() {
					debug!("console event queue closed");
					break;
				},
				key = input.next() => match key {
					Some(Input::Keys(keys)) => {
						if !wb.consoles_mut().send(node, &keys) {
							trace!("dropped {} bytes of input, console not accepting", keys.len());
						}
					},
					Some(Input::Detach) | None => {
						debug!("detaching from {}", node);
						wb.close_console(node);
						break;
					},
				},
				_ = resize.tick() => {
					let now = terminal::size().with_context(|| "reading terminal size")?;
					if size != Some(now) {
						size = Some(now);
						self.refit(wb, node, now);
					}
				},
			}

			let session = match wb.consoles().session(node) {
				Some(s) => s,
				None => break,
			};
			let transcript = session.surface().transcript();
			if transcript.len() > written {
				let mut lock = stdout.lock();
				lock.write_all(&transcript[written..])?;
				lock.flush()?;
				written = transcript.len();
			}
			if matches!(session.state(), SessionState::Closed | SessionState::Error) {
				break;
			}
		}
		Ok(())
	}

	fn refit(&self, wb: &mut Workbench, node: &str, (cols, rows): (u16, u16)) {
		let Some(session) = wb.consoles_mut().session_mut(node) else {
			return;
		};
		// aim at the middle of the last cell so float error can't lose a column
		let width = (cols as f64 + 0.5) * self.cell.width;
		let height = (rows as f64 + 0.5) * self.cell.height;
		let fitted = session.surface_mut().fit(width, height);
		debug!("local terminal is {}x{}, console surface now {:?}", cols, rows, fitted);
	}
}

/// Reads stdin on its own thread and forwards it, split at the detach key.
fn drive_input(mut to_console: Sender<Input>) -> Result<JoinHandle<Result<(), RawError>>, std::io::Error> {
	std::thread::Builder::new()
		.name("read_stdin".to_owned())
		.spawn(move || futures::executor::block_on(async {
			use std::io::Read;
			let mut buf = vec![0; 1024];
			let mut sin = std::io::stdin();

			loop {
				let filled_bytes = match sin.read(&mut buf) {
					Ok(0) => break,
					Ok(n) => n,
					Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
					Err(e) => return Err(e.into()),
				};
				for input in split_input(&buf[..filled_bytes])? {
					let detach = input == Input::Detach;
					to_console.send(input).await?;
					if detach {
						return Ok(());
					}
				}
			}

			debug!("stdin closed");
			to_console.close_channel();
			Result::<(), RawError>::Ok(())
		}))
}

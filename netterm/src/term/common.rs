
use std::borrow::Cow;

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use log::{debug, trace, warn};

use netlab::lab::NodeId;

use crate::term::{BoxedConsole, TransportError};

/// Identifies one transport attempt. Reopening a node's console gets a fresh id, so events from an
/// earlier transport can be told apart and dropped.
pub type SessionId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEventKind {
	Opened,
	Data(Vec<u8>),
	Error(String),
	Closed,
}

/// What a transport task reports back to the core loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleEvent {
	pub node: NodeId,
	pub session: SessionId,
	pub kind: ConsoleEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermMsg {
	/// Sends data to the console
	Data(String),
	/// Closes the console (or abandons the handshake)
	Close,
}
impl TermMsg {
	pub fn text<S: Into<String>>(s: S) -> TermMsg {
		TermMsg::Data(s.into())
	}
}

/// `hex : text` preview of a frame for trace logs, cut down in the middle when long.
pub(crate) fn preview(data: &[u8]) -> String {
	let as_hex = hex::encode(data);
	let text = String::from_utf8_lossy(data);
	format!("{:?} : {:?}", truncate_string(&as_hex, 10), truncate_string(&text, 10))
}

fn truncate_string(s: &str, len: usize) -> Cow<'_, str> {
	let count = s.chars().count();
	if count > len*4 {
		let head: String = s.chars().take(len).collect();
		let tail: String = s.chars().skip(count - len).collect();
		Cow::from(format!("{}<...truncated...>{}", head, tail))
	} else {
		Cow::from(s)
	}
}

struct Poster {
	node: NodeId,
	session: SessionId,
	events: UnboundedSender<ConsoleEvent>,
}
impl Poster {
	fn post(&self, kind: ConsoleEventKind) {
		let event = ConsoleEvent { node: self.node.clone(), session: self.session, kind };
		if self.events.unbounded_send(event).is_err() {
			trace!("console {} #{}: event queue gone", self.node, self.session);
		}
	}
}

/// Starts the task that owns one console transport. The returned sender carries keystrokes and the close request.
pub(crate) fn spawn_pump(
	connect: BoxFuture<'static, Result<BoxedConsole, TransportError>>,
	node: NodeId,
	session: SessionId,
	events: UnboundedSender<ConsoleEvent>,
) -> UnboundedSender<TermMsg> {
	let (tx, rx) = mpsc::unbounded();
	tokio::spawn(pump(connect, rx, Poster { node, session, events }));
	tx
}

async fn pump(
	mut connect: BoxFuture<'static, Result<BoxedConsole, TransportError>>,
	mut commands: UnboundedReceiver<TermMsg>,
	poster: Poster,
) {
	let id = format!("{} #{}", poster.node, poster.session);

	// the handshake can be abandoned by a close request
	let console = loop {
		tokio::select! {
			res = &mut connect => match res {
				Ok(console) => break console,
				Err(e) => {
					debug!("console {}: connect failed: {}", id, e);
					poster.post(ConsoleEventKind::Error(e.to_string()));
					return;
				},
			},
			cmd = commands.next() => match cmd {
				Some(TermMsg::Data(s)) => warn!("console {}: dropping {} bytes typed before the console opened", id, s.len()),
				Some(TermMsg::Close) | None => {
					debug!("console {}: handshake abandoned", id);
					return;
				},
			},
		}
	};

	debug!("console {}: open", id);
	poster.post(ConsoleEventKind::Opened);
	let (mut sink, mut stream) = console.split();

	loop {
		tokio::select! {
			frame = stream.next() => match frame {
				Some(Ok(data)) => {
					trace!("console {}: recv {}", id, preview(&data));
					poster.post(ConsoleEventKind::Data(data));
				},
				Some(Err(e)) => {
					debug!("console {}: stream error: {}", id, e);
					poster.post(ConsoleEventKind::Error(e.to_string()));
					let _ = sink.close().await;
					return;
				},
				None => {
					debug!("console {}: remote closed", id);
					poster.post(ConsoleEventKind::Closed);
					return;
				},
			},
			cmd = commands.next() => match cmd {
				Some(TermMsg::Data(s)) => {
					trace!("console {}: send {}", id, preview(s.as_bytes()));
					if let Err(e) = sink.send(s).await {
						poster.post(ConsoleEventKind::Error(e.to_string()));
						let _ = sink.close().await;
						return;
					}
				},
				Some(TermMsg::Close) | None => {
					if let Err(e) = sink.close().await {
						debug!("console {}: error while closing: {}", id, e);
					}
					poster.post(ConsoleEventKind::Closed);
					return;
				},
			},
		}
	}
}

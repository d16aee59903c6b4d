//! One node's console: `Idle -> Connecting -> Open -> Closed`, with `Error` absorbing transport failures.

use futures::channel::mpsc::UnboundedSender;
use log::{debug, trace, warn};

use netlab::lab::NodeId;

use crate::term::common::{self, ConsoleEvent, ConsoleEventKind, SessionId, TermMsg};
use crate::term::surface::{CONNECTED_BANNER, DISCONNECTED_BANNER, TerminalSurface};
use crate::term::Connector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Idle,
	Connecting,
	Open,
	Closed,
	Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
	/// The user closed (or dismissed) the console
	User,
	/// The device side hung up
	Remote,
	/// The node was deleted from the lab
	NodeRemoved,
	/// The node left the running state
	NodeStopped,
}

#[derive(Debug)]
pub struct ConsoleSession {
	id: SessionId,
	node: NodeId,
	label: String,
	state: SessionState,
	surface: TerminalSurface,
	outbound: Option<UnboundedSender<TermMsg>>,
	error: Option<String>,
	close_reason: Option<CloseReason>,
}

impl ConsoleSession {
	pub fn new(id: SessionId, node: impl Into<NodeId>, label: impl Into<String>) -> ConsoleSession {
		ConsoleSession {
			id,
			node: node.into(),
			label: label.into(),
			state: SessionState::Idle,
			surface: TerminalSurface::new(),
			outbound: None,
			error: None,
			close_reason: None,
		}
	}

	// Getters
	pub fn id(&self) -> SessionId { self.id }
	pub fn node(&self) -> &str { &self.node }
	pub fn label(&self) -> &str { &self.label }
	pub fn state(&self) -> SessionState { self.state }
	pub fn surface(&self) -> &TerminalSurface { &self.surface }
	pub fn surface_mut(&mut self) -> &mut TerminalSurface { &mut self.surface }
	pub fn error(&self) -> Option<&str> { self.error.as_deref() }
	pub fn close_reason(&self) -> Option<CloseReason> { self.close_reason }

	/// Connecting or open: the node's one live transport.
	pub fn is_live(&self) -> bool {
		matches!(self.state, SessionState::Connecting | SessionState::Open)
	}

	/// Starts the handshake. Only valid from `Idle`.
	pub fn start(&mut self, connector: &dyn Connector, url: &str, events: UnboundedSender<ConsoleEvent>) -> bool {
		if self.state != SessionState::Idle {
			warn!("console {} #{}: start requested while {:?}", self.node, self.id, self.state);
			return false;
		}
		debug!("console {} #{}: connecting to {}", self.node, self.id, url);
		let connect = connector.connect(url);
		self.outbound = Some(common::spawn_pump(connect, self.node.clone(), self.id, events));
		self.state = SessionState::Connecting;
		true
	}

	/// Feeds one transport event through the state machine.
	pub fn handle(&mut self, kind: ConsoleEventKind) {
		match (self.state, kind) {
			(SessionState::Connecting, ConsoleEventKind::Opened) => {
				self.state = SessionState::Open;
				self.surface.write_str(CONNECTED_BANNER);
				self.surface.attach_input();
			},
			(SessionState::Open, ConsoleEventKind::Data(data)) => {
				self.surface.write(&data);
			},
			(SessionState::Connecting | SessionState::Open, ConsoleEventKind::Error(e)) => {
				// the indicator shows the failure, the transcript is left alone
				warn!("console {} #{}: {}", self.node, self.id, e);
				self.state = SessionState::Error;
				self.error = Some(e);
				self.release_transport();
			},
			(SessionState::Connecting | SessionState::Open, ConsoleEventKind::Closed) => {
				if self.state == SessionState::Open {
					self.surface.write_str(DISCONNECTED_BANNER);
				}
				debug!("console {} #{}: closed by remote", self.node, self.id);
				self.state = SessionState::Closed;
				self.close_reason = Some(CloseReason::Remote);
				self.release_transport();
			},
			(state, kind) => {
				trace!("console {} #{}: ignoring {:?} while {:?}", self.node, self.id, kind, state);
			},
		}
	}

	/// Forwards keystrokes verbatim. Only an open session with input attached accepts them.
	pub fn send(&mut self, keys: &str) -> bool {
		if self.state != SessionState::Open || !self.surface.accepts_input() {
			return false;
		}
		match &self.outbound {
			Some(tx) => tx.unbounded_send(TermMsg::text(keys)).is_ok(),
			None => false,
		}
	}

	/// Closes the session. Closing an already closed session does nothing and returns false.
	pub fn close(&mut self, reason: CloseReason) -> bool {
		if self.state == SessionState::Closed {
			return false;
		}
		debug!("console {} #{}: closing ({:?})", self.node, self.id, reason);
		if let Some(tx) = &self.outbound {
			// the pump may already be gone
			let _ = tx.unbounded_send(TermMsg::Close);
		}
		self.state = SessionState::Closed;
		self.close_reason = Some(reason);
		self.release_transport();
		true
	}

	fn release_transport(&mut self) {
		self.outbound = None;
		self.surface.detach_input();
	}
}

//! Every console the client has open, keyed by node id.

use std::sync::Arc;

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use log::{debug, trace};
use thiserror::Error;

use netlab::lab::{Node, NodeId};
use netlab::{Config, ConfigError};

use crate::term::{CloseReason, ConsoleEvent, ConsoleSession, Connector, SessionId};

#[derive(Debug, Error)]
pub enum ConsoleError {
	#[error("Node {0} is not running")]
	NodeNotRunning(NodeId),
	#[error("No node with id {0}")]
	UnknownNode(NodeId),
	#[error("Unable to build the console address")]
	Endpoint(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
	/// A new transport was started
	Opened(SessionId),
	/// The node already had a live session, which now has focus
	Focused(SessionId),
}

pub struct Consoles {
	config: Config,
	connector: Arc<dyn Connector>,
	sessions: Vec<ConsoleSession>,
	active: Option<NodeId>,
	next_session: SessionId,
	events_tx: UnboundedSender<ConsoleEvent>,
	events_rx: UnboundedReceiver<ConsoleEvent>,
}
impl std::fmt::Debug for Consoles {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Consoles")
			.field("config", &self.config)
			.field("sessions", &self.sessions)
			.field("active", &self.active)
			.finish()
	}
}

impl Consoles {
	pub fn new(config: Config, connector: Arc<dyn Connector>) -> Consoles {
		let (events_tx, events_rx) = mpsc::unbounded();
		Consoles {
			config,
			connector,
			sessions: Vec::new(),
			active: None,
			next_session: 1,
			events_tx,
			events_rx,
		}
	}

	// Getters
	pub fn sessions(&self) -> &[ConsoleSession] { &self.sessions }
	pub fn session(&self, node: &str) -> Option<&ConsoleSession> { self.sessions.iter().find(|s| s.node() == node) }
	pub fn session_mut(&mut self, node: &str) -> Option<&mut ConsoleSession> { self.sessions.iter_mut().find(|s| s.node() == node) }
	pub fn active(&self) -> Option<&ConsoleSession> { self.session(self.active.as_deref()?) }

	pub fn focus(&mut self, node: &str) -> bool {
		if self.session(node).is_some() {
			self.active = Some(node.to_owned());
			true
		} else {
			false
		}
	}

	/// Opens (or focuses) the console of a running node. A session left `Closed` or `Error` is replaced.
	pub fn open(&mut self, node: &Node) -> Result<OpenOutcome, ConsoleError> {
		if !node.status.is_running() {
			return Err(ConsoleError::NodeNotRunning(node.id.clone()));
		}

		if let Some(existing) = self.session(&node.id) {
			if existing.is_live() {
				let id = existing.id();
				debug!("console for {} already live (#{}), focusing it", node.id, id);
				self.active = Some(node.id.clone());
				return Ok(OpenOutcome::Focused(id));
			}
			debug!("replacing finished console #{} for {}", existing.id(), node.id);
			self.release(&node.id);
		}

		let url = self.config.console_url(&node.id)?;
		let id = self.next_session;
		self.next_session += 1;

		let mut session = ConsoleSession::new(id, node.id.clone(), node.label.clone());
		session.start(self.connector.as_ref(), &url, self.events_tx.clone());
		self.sessions.push(session);
		self.active = Some(node.id.clone());
		Ok(OpenOutcome::Opened(id))
	}

	/// Closes the node's console and releases it. Returns false if there was nothing to close.
	pub fn close(&mut self, node: &str, reason: CloseReason) -> bool {
		match self.session_mut(node) {
			Some(session) => {
				session.close(reason);
				self.release(node);
				true
			},
			None => false,
		}
	}

	pub fn send(&mut self, node: &str, keys: &str) -> bool {
		self.session_mut(node).map(|s| s.send(keys)).unwrap_or(false)
	}

	/// Hands an event to its session. Events for a released or replaced session are dropped.
	pub fn dispatch(&mut self, event: ConsoleEvent) -> bool {
		let ConsoleEvent { node, session, kind } = event;
		match self.sessions.iter_mut().find(|s| s.node() == node && s.id() == session) {
			Some(s) => {
				s.handle(kind);
				true
			},
			None => {
				trace!("dropping stale console event for {} #{}", node, session);
				false
			},
		}
	}

	/// Dispatches every event already queued, without waiting. Returns how many reached a session.
	pub fn drain(&mut self) -> usize {
		let mut delivered = 0;
		while let Ok(Some(event)) = self.events_rx.try_next() {
			if self.dispatch(event) {
				delivered += 1;
			}
		}
		delivered
	}

	/// Waits for the next transport event.
	pub async fn next_event(&mut self) -> Option<ConsoleEvent> {
		self.events_rx.next().await
	}

	fn release(&mut self, node: &str) {
		self.sessions.retain(|s| s.node() != node);
		if self.active.as_deref() == Some(node) {
			self.active = None;
		}
	}
}

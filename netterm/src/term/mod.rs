
use std::fmt::Debug;

use futures::future::BoxFuture;
use futures::{Sink, Stream};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
	#[error("Unable to reach the device console: {0}")]
	Connect(String),
	#[error("The console stream failed: {0}")]
	Stream(String),
}

/// A stream/sink pair suitable for interfacing with a device console.
///
/// The stream yields bytes exactly as the console sent them. Anything sent in goes to the console verbatim.
pub trait ConsoleStream: Debug + Send + Unpin + Stream<Item = Result<Vec<u8>, TransportError>> + Sink<String, Error = TransportError> {}
impl<T> ConsoleStream for T where T: Debug + Send + Unpin + Stream<Item = Result<Vec<u8>, TransportError>> + Sink<String, Error = TransportError> {}

pub type BoxedConsole = Box<dyn ConsoleStream>;

/// Opens console streams. The websocket backend is the real one; tests swap in an in-memory one.
pub trait Connector: Send + Sync {
	fn connect(&self, url: &str) -> BoxFuture<'static, Result<BoxedConsole, TransportError>>;
}

pub mod backend;
pub mod common;
pub mod frontend;
pub mod session;
pub mod surface;

pub use common::{ConsoleEvent, ConsoleEventKind, SessionId, TermMsg};
pub use session::{CloseReason, ConsoleSession, SessionState};
pub use surface::TerminalSurface;

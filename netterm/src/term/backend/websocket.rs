
use std::{fmt::Debug, pin::Pin, task::{Context, Poll}};

use futures::future::{BoxFuture, FutureExt};
use futures::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, trace, warn};

use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite};
use tungstenite::error::Error as WsError;
use tungstenite::protocol::Message;

use crate::term::common::preview;
use crate::term::{BoxedConsole, Connector, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn stream_error(e: WsError) -> TransportError {
	TransportError::Stream(e.to_string())
}

/// A websocket wrapper for device consoles.
///
/// Console output may arrive in either Text or Binary frames and is surfaced as raw bytes. Input is sent as Text frames.
#[derive(Debug)]
pub struct WsConsole {
	ws: WsStream,
	ws_closed: bool,
}
impl WsConsole {
	pub async fn connect(url: &str) -> Result<WsConsole, WsError> {
		let (ws, resp) = tokio_tungstenite::connect_async(url).await?;

		debug!("websocket to {} established (HTTP status code {:?})", url, resp.status());
		trace!("websocket headers:");
		for header in resp.headers().iter() {
			trace!("\t{:?}", header);
		}

		Ok(WsConsole {
			ws,
			ws_closed: false,
		})
	}
}

impl Stream for WsConsole {
	type Item = Result<Vec<u8>, TransportError>;
	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		// tokio-tungstenite answers pings and close handshakes itself

		loop {
			match self.ws.poll_next_unpin(cx) {
				Poll::Pending => return Poll::Pending,
				Poll::Ready(None) => {
					debug!("WebSocket remote has closed");
					self.ws_closed = true;
					return Poll::Ready(None);
				},
				Poll::Ready(Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed))) => {
					self.ws_closed = true;
					return Poll::Ready(None);
				},
				Poll::Ready(Some(Err(e))) => {
					return Poll::Ready(Some(Err(stream_error(e))));
				},
				Poll::Ready(Some(Ok(msg))) => {
					log_message("recv", &msg);
					match msg {
						Message::Binary(data) => return Poll::Ready(Some(Ok(data))),
						Message::Text(s) => return Poll::Ready(Some(Ok(s.into_bytes()))),
						Message::Close(frame) => {
							debug!("console sent close ({:?})", frame);
							// loop around, the stream ends once the handshake completes
						},
						Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
							// loop around again
						},
					}
				},
			}
		}
	}
}
impl Sink<String> for WsConsole {
	type Error = TransportError;
	fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		self.ws.poll_ready_unpin(cx).map_err(stream_error)
	}
	fn start_send(mut self: Pin<&mut Self>, item: String) -> Result<(), Self::Error> {
		let msg = Message::Text(item);
		log_message("send", &msg);
		self.ws.start_send_unpin(msg).map_err(stream_error)
	}
	fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		self.ws.poll_flush_unpin(cx).map_err(stream_error)
	}
	fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		// Close the underlying sink. Will also send the websocket close frame.
		let result = match self.ws.poll_close_unpin(cx) {
			Poll::Ready(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => Poll::Ready(Ok(())),
			other => other.map_err(stream_error),
		};

		if let Poll::Ready(Ok(())) = result {
			self.ws_closed = true;
		};

		result
	}
}
impl std::ops::Drop for WsConsole {
	fn drop(&mut self) {
		if ! self.ws_closed {
			warn!("Dropped WsConsole without closing the sink");
		}
	}
}

/// Opens consoles over websockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;
impl Connector for WsConnector {
	fn connect(&self, url: &str) -> BoxFuture<'static, Result<BoxedConsole, TransportError>> {
		let url = url.to_owned();
		async move {
			WsConsole::connect(&url).await
				.map(|ws| Box::new(ws) as BoxedConsole)
				.map_err(|e| TransportError::Connect(e.to_string()))
		}.boxed()
	}
}

fn log_message(direction: &str, msg: &Message) {
	if !log::log_enabled!(log::Level::Trace) {
		return;
	}
	match msg {
		Message::Text(s) => trace!("{} : Text : {}", direction, preview(s.as_bytes())),
		Message::Binary(b) => trace!("{} : Binary ({} B) : {}", direction, b.len(), preview(b)),
		Message::Ping(b) => trace!("{} : Ping : {}", direction, preview(b)),
		Message::Pong(b) => trace!("{} : Pong : {}", direction, preview(b)),
		Message::Close(cf) => trace!("{} : Close : {:?}", direction, cf),
		Message::Frame(f) => trace!("{} : Frame : {:?}", direction, f.header()),
	}
}

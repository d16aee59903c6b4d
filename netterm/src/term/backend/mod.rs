
pub mod websocket;

pub use websocket::{WsConnector, WsConsole};


pub mod lab;
pub mod store;
pub mod canvas;
pub mod catalog;
pub mod chat;
pub mod rest_types;
pub mod rest;
pub mod utils;

pub use rest_types as rt;

use thiserror::Error;

pub const ENV_NETLAB_URL: &str = "NETLAB_URL";
pub const DEFAULT_URL: &str = "http://localhost:8000";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("Invalid backend URL `{url}`: {reason}")]
	InvalidUrl { url: String, reason: String },
}

/// Where the backend lives. Everything else (REST base, console endpoints) is derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
	pub base_url: String,
}
impl Default for Config {
	fn default() -> Config {
		Config::new(DEFAULT_URL)
	}
}
impl Config {
	pub fn new(base_url: impl Into<String>) -> Config {
		let base_url = base_url.into();
		Config { base_url: base_url.trim_end_matches('/').to_owned() }
	}

	/// Reads the backend URL from the environment (`NETLAB_URL`), falling back to the local default.
	pub fn from_env() -> Config {
		Config::from_lookup(std::env::var(ENV_NETLAB_URL).ok())
	}

	fn from_lookup(value: Option<String>) -> Config {
		match value.filter(|v| !v.trim().is_empty()) {
			Some(url) => Config::new(url.trim()),
			None => Config::default(),
		}
	}

	/// `<base>/api/v1`
	pub fn api_base(&self) -> String {
		format!("{}/api/v1", self.base_url)
	}

	/// The console stream for a node: `ws://` for plain http backends, `wss://` for https ones.
	pub fn console_url(&self, node_id: &str) -> Result<String, ConfigError> {
		let invalid = |reason: String| ConfigError::InvalidUrl { url: self.base_url.clone(), reason };

		let url = reqwest::Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
		let scheme = match url.scheme() {
			"https" => "wss",
			"http" => "ws",
			other => return Err(invalid(format!("unsupported scheme `{}`", other))),
		};
		let host = url.host_str().ok_or_else(|| invalid("no host".into()))?;
		let authority = match url.port() {
			Some(port) => format!("{}:{}", host, port),
			None => host.to_owned(),
		};

		Ok(format!("{}://{}/api/v1/console/nodes/{}/console", scheme, authority, node_id))
	}
}

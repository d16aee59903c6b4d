
use std::fmt;

use log::{debug, trace};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::catalog::Catalog;
use crate::lab::Lab;
use crate::rest_types as rt;
use crate::Config;

type RResult<T> = Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	Network(reqwest::Error),
	Response(ApiError),
	Serialization(serde_json::Error),
}
impl From<reqwest::Error> for Error { fn from(e: reqwest::Error) -> Error { Error::Network(e) } }
impl From<ApiError> for Error { fn from(e: ApiError) -> Error { Error::Response(e) } }
impl From<serde_json::Error> for Error { fn from(e: serde_json::Error) -> Error { Error::Serialization(e) } }
impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::Network(e) => write!(f, "Network error: {}", e),
			Error::Response(e) => write!(f, "Bad response from {}: {}", e.endpoint, e.error_type),
			Error::Serialization(e) => write!(f, "Unable to serialize request: {}", e),
		}
	}
}
impl std::error::Error for Error {}

#[derive(Debug)]
pub struct ApiError {
	endpoint: String,
	error_type: ApiErrorType,
}
impl ApiError {
	fn new(endpoint: impl Into<String>, error_type: ApiErrorType) -> ApiError {
		ApiError {
			endpoint: endpoint.into(),
			error_type,
		}
	}
}

#[derive(Debug)]
enum ApiErrorType {
	/// Catch-all
	Unknown(String),

	/// Got a bad response from the server
	BadResponse(String, String),

	/// Error decoding a JSON response. Contains erroring JSON, as well as decoding error.
	JsonDecode(String, String, serde_json::Error),
}
impl ApiErrorType {
	fn unknown<S: Into<String>>(s: S) -> ApiErrorType {
		ApiErrorType::Unknown(s.into())
	}
}
impl fmt::Display for ApiErrorType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ApiErrorType::Unknown(s) => f.write_str(s),
			ApiErrorType::BadResponse(msg, body) => write!(f, "{}: {}", msg, body),
			ApiErrorType::JsonDecode(msg, _, e) => write!(f, "{}: {}", msg, e),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
enum RawApiResponse {
	None,
	PlainText(String),
	Json(Value),
}
impl RawApiResponse {
	async fn extract(resp: Response) -> RResult<(u16, RawApiResponse)> {
		let endpoint = resp.url().path().to_string();
		let status = resp.status().as_u16();
		if resp.content_length() == Some(0) {
			return Ok((status, RawApiResponse::None));
		}

		let ct = resp.headers().get("content-type")
			.and_then(|ct| ct.to_str().ok())
			.map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
			.ok_or_else(|| ApiError::new(endpoint.as_str(), ApiErrorType::unknown("response without a Content-Type header")))?;

		let text = resp.text().await?;
		trace!("{} {} ({}): {}", status, endpoint, ct, text);
		match ct.as_str() {
			"text/plain" => Ok((status, RawApiResponse::PlainText(text))),
			"application/json" => {
				serde_json::from_str::<Value>(&text)
					.map_err(|e| ApiError::new(endpoint, ApiErrorType::JsonDecode("Unable to parse returned JSON".into(), text, e)).into())
					.map(|as_v| (status, RawApiResponse::Json(as_v)))
			},
			ct => Err(ApiError::new(endpoint, ApiErrorType::unknown(format!("unknown content-type: `{}`", ct))).into()),
		}
	}
}

/// Error body of the backend's 4xx responses
#[derive(Deserialize)]
struct Detail {
	pub detail: String,
}

fn decode<T: DeserializeOwned>(endpoint: &str, j: Value) -> RResult<T> {
	match serde_json::from_value::<T>(j.clone()) {
		Ok(t) => Ok(t),
		Err(sje) => Err(ApiError::new(endpoint, ApiErrorType::JsonDecode("Unable to read JSON response as a proper type".into(), j.to_string(), sje)).into()),
	}
}

fn unexpected<T>(endpoint: &str, status: u16, resp: RawApiResponse) -> RResult<T> {
	let body = match resp {
		RawApiResponse::Json(j) => match serde_json::from_value::<Detail>(j.clone()) {
			Ok(d) => d.detail,
			Err(_) => j.to_string(),
		},
		RawApiResponse::PlainText(s) => s,
		RawApiResponse::None => String::new(),
	};
	Err(ApiError::new(endpoint, ApiErrorType::BadResponse(format!("Bad response for status {}", status), body)).into())
}

/// HTTP client for the catalog, chat and lab endpoints.
#[derive(Debug, Clone)]
pub struct Client {
	client: reqwest::Client,
	api_base: String,
}

impl Client {
	pub fn new(config: &Config) -> RResult<Client> {
		let client = reqwest::Client::builder()
			.build()
			.map_err(Error::Network)?;
		Ok(Client { client, api_base: config.api_base() })
	}

	fn get_v1<D: fmt::Display>(&self, endpoint: D) -> reqwest::RequestBuilder {
		self.client.get(format!("{}/{}", self.api_base, endpoint).as_str())
	}
	fn post_v1<D: fmt::Display>(&self, endpoint: D) -> reqwest::RequestBuilder {
		self.client.post(format!("{}/{}", self.api_base, endpoint).as_str())
	}

	async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> RResult<T> {
		let resp = self.get_v1(endpoint).send().await?;
		let path = resp.url().path().to_owned();
		match RawApiResponse::extract(resp).await? {
			(200, RawApiResponse::Json(j)) => decode(&path, j),
			(status, resp) => unexpected(&path, status, resp),
		}
	}

	/// Every device image the backend offers.
	pub async fn images(&self) -> RResult<rt::ImageList> {
		self.get_json("images/").await
	}

	pub async fn vendors(&self) -> RResult<rt::VendorList> {
		self.get_json("vendors/").await
	}

	/// Images and vendors together, as the device library shows them.
	pub async fn catalog(&self) -> RResult<Catalog> {
		let images = self.images().await?;
		let vendors = self.vendors().await?;
		debug!("catalog: {} images from {} vendors", images.count, vendors.count);
		Ok(Catalog::new(images.images, vendors.vendors))
	}

	/// Gets a lab's topology. If the lab is not found, returns `Ok(None)`
	pub async fn lab(&self, lab_id: &str) -> RResult<Option<Lab>> {
		let resp = self.get_v1(format_args!("labs/{}", lab_id)).send().await?;
		let path = resp.url().path().to_owned();

		match RawApiResponse::extract(resp).await? {
			(200, RawApiResponse::Json(j)) => Ok(Some(decode::<rt::LabDescription>(&path, j)?.into())),
			(404, _) => Ok(None),
			(status, resp) => unexpected(&path, status, resp),
		}
	}

	/// Sends a chat message. The returned actions are proposals; nothing has been applied yet.
	pub async fn chat(&self, req: &rt::ChatRequest) -> RResult<rt::ChatResponse> {
		let body = serde_json::to_vec(req)?;
		let resp = self.post_v1("chat/")
			.header("content-type", "application/json")
			.body(body)
			.send().await?;
		let path = resp.url().path().to_owned();

		match RawApiResponse::extract(resp).await? {
			(200, RawApiResponse::Json(j)) => decode(&path, j),
			(status, resp) => unexpected(&path, status, resp),
		}
	}
}

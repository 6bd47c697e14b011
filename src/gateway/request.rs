//! Caller-facing request description, resolved against the gateway configuration at send time.

// crates.io
use http::{
	HeaderMap, HeaderName, HeaderValue, Method,
	header::{ACCEPT, CONTENT_TYPE},
};
// self
use crate::{_prelude::*, error::ConfigError};

/// API request expressed relative to the configured base URL.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Path below the base URL, e.g. `/api/v1/products`.
	pub path: String,
	/// Query pairs appended to the URL.
	pub query: Vec<(String, String)>,
	/// Extra headers; `Authorization` is managed by the gateway and overwritten.
	pub headers: HeaderMap,
	/// Optional request body.
	pub body: Option<Vec<u8>>,
	retried: bool,
}
impl ApiRequest {
	/// Creates a request for `method` + `path`.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		let mut headers = HeaderMap::new();

		headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

		Self { method, path: path.into(), query: Vec::new(), headers, body: None, retried: false }
	}

	/// `GET` request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// `POST` request.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// `PUT` request.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// `PATCH` request.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::PATCH, path)
	}

	/// `DELETE` request.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Appends a query pair.
	pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Sets a header, replacing any previous value.
	pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Serializes `body` as JSON and sets the content type.
	pub fn json<T>(mut self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		let bytes = serde_json::to_vec(body).map_err(ConfigError::InvalidBody)?;

		self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		self.body = Some(bytes);

		Ok(self)
	}

	/// Marks the request as already retried, so an auth failure is surfaced instead of
	/// triggering a refresh.
	pub fn mark_retried(mut self) -> Self {
		self.retried = true;

		self
	}

	/// Returns `true` once the request has been through a refresh.
	pub fn is_retried(&self) -> bool {
		self.retried
	}
}

//! Transport primitives for talking to the storefront API.
//!
//! The module exposes [`GatewayHttpClient`] alongside the wire-level [`HttpRequest`] and
//! [`ApiResponse`] types so downstream crates can plug in their own HTTP stack (or a scripted
//! fake in tests) without touching the refresh coordination. The gateway resolves URLs, attaches
//! credentials, and classifies statuses; transports only move bytes.

// crates.io
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
// self
use crate::{_prelude::*, error::TransportError};

/// Boxed future returned by [`GatewayHttpClient::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of executing gateway requests.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by every
/// clone of a gateway, and the futures they return must be `Send` so callers can spawn the
/// gateway's request futures onto a multi-threaded runtime. A transport reports every HTTP
/// response as `Ok`, whatever the status; only failures that prevent a response from
/// arriving are errors.
pub trait GatewayHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and buffers the full response body.
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// Fully resolved request handed to a [`GatewayHttpClient`].
#[derive(Clone, Debug)]
pub struct HttpRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URL.
	pub url: Url,
	/// Request headers, including `Authorization` when a token is attached.
	pub headers: HeaderMap,
	/// Optional request body.
	pub body: Option<Vec<u8>>,
}
impl HttpRequest {
	/// Creates a body-less request without headers.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: None }
	}
}

/// Buffered HTTP response returned by transports and by the gateway.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// Response status.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Creates a response with empty headers.
	pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: HeaderMap::new(), body: body.into() }
	}

	/// Decodes the body as `T`.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| Error::Decode { status: self.status.as_u16(), source })
	}

	/// Decodes the API's `{ "data": T }` envelope and returns `T`.
	pub fn data<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.json::<Envelope<T>>().map(|envelope| envelope.data)
	}
}

/// Response envelope used by every storefront API endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
	/// Endpoint payload.
	pub data: T,
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// The refresh credential is an HTTP-only cookie, so the wrapped client must keep a cookie
/// store; [`ReqwestHttpClient::new`] enables one and disables redirect following so auth
/// failures surface as the original 401/403 instead of a login page.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Builds a cookie-aware client that does not follow redirects.
	pub fn new() -> Result<Self, crate::error::ConfigError> {
		let client = ReqwestClient::builder()
			.cookie_store(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	///
	/// Enable `cookie_store(true)` on custom clients or refresh calls will go out without the
	/// refresh cookie.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl GatewayHttpClient for ReqwestHttpClient {
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let HttpRequest { method, url, headers, body } = request;
			let mut builder = client.request(method, url).headers(headers);

			if let Some(body) = body {
				builder = builder.body(body);
			}

			let response = builder.send().await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await?.to_vec();

			Ok(ApiResponse { status, headers, body })
		})
	}
}

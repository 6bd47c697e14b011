//! Gateway-level error types shared across the transport, session, and refresh layers.

// crates.io
use http::{StatusCode, header::InvalidHeaderValue};
// self
use crate::_prelude::*;

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Session persistence failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The API answered with a non-success status.
	#[error(transparent)]
	Status(#[from] StatusError),
	/// The request was queued behind a token refresh that failed.
	#[error(transparent)]
	Refresh(#[from] RefreshError),

	/// Response body did not match the expected envelope.
	#[error("Response body (HTTP {status}) could not be decoded.")]
	Decode {
		/// HTTP status of the undecodable response.
		status: u16,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// A queued request waited longer than the configured queue timeout.
	#[error("Gave up after {waited:?} waiting for the in-flight token refresh.")]
	QueueTimeout {
		/// How long the request waited.
		waited: Duration,
	},
	/// A queued request was cancelled before the refresh settled.
	#[error("Request was cancelled while waiting for the in-flight token refresh.")]
	Cancelled,
}
impl Error {
	/// Returns the HTTP status when the error came from an API response.
	pub fn status(&self) -> Option<StatusCode> {
		match self {
			Self::Status(err) => Some(err.status),
			_ => None,
		}
	}

	/// Returns `true` for 401/403 responses.
	pub fn is_auth_failure(&self) -> bool {
		matches!(self, Self::Status(err) if err.is_auth_failure())
	}
}

/// Configuration and validation failures raised by the gateway.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL cannot be parsed.
	#[error("API base URL is invalid.")]
	InvalidBaseUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Base URL uses a scheme other than http/https.
	#[error("API base URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// Offending URL.
		url: String,
	},
	/// Base URL cannot carry a path (e.g. `mailto:`) or includes a query/fragment.
	#[error("API base URL must be a plain origin or path prefix: {url}.")]
	BaseUrlNotAPrefix {
		/// Offending URL.
		url: String,
	},
	/// An endpoint path does not start with `/`.
	#[error("Endpoint path `{path}` must start with `/`.")]
	InvalidPath {
		/// Offending path.
		path: String,
	},
	/// A request URL could not be assembled from the base URL and path.
	#[error("Request URL for `{path}` is invalid.")]
	InvalidRequestUrl {
		/// Request path that failed.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A header value contains characters HTTP does not allow.
	#[error("The {name} header value is invalid.")]
	InvalidHeader {
		/// Header name.
		name: &'static str,
		/// Underlying validation failure.
		#[source]
		source: InvalidHeaderValue,
	},
	/// A request body could not be serialized.
	#[error("Request body could not be serialized to JSON.")]
	InvalidBody(#[source] serde_json::Error),
	/// A timeout was configured as zero.
	#[error("The {name} must be greater than zero.")]
	ZeroTimeout {
		/// Which timeout failed validation.
		name: &'static str,
	},
	/// Required environment variable is missing.
	#[error("Environment variable {name} is not set.")]
	MissingEnv {
		/// Variable name.
		name: &'static str,
	},
	/// Environment variable is set but cannot be parsed.
	#[error("Environment variable {name} is invalid: {reason}.")]
	InvalidEnv {
		/// Variable name.
		name: &'static str,
		/// Why the value was rejected.
		reason: String,
	},
	/// Storage namespace is invalid.
	#[error("Storage namespace is invalid.")]
	InvalidNamespace(#[from] crate::auth::NamespaceError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Non-success HTTP response surfaced to the caller.
#[derive(Clone, Debug, ThisError)]
#[error("{path} answered with HTTP {status}.")]
pub struct StatusError {
	/// Response status.
	pub status: StatusCode,
	/// Request path that produced the response.
	pub path: String,
	/// Truncated response body, useful for logs and UI messages.
	pub body_preview: String,
}
impl StatusError {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Builds a status error, truncating the body to a short preview.
	pub fn new(status: StatusCode, path: impl Into<String>, body: &[u8]) -> Self {
		Self { status, path: path.into(), body_preview: truncate_preview(body) }
	}

	/// Returns `true` for 401 Unauthorized and 403 Forbidden.
	pub fn is_auth_failure(&self) -> bool {
		matches!(self.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
	}
}

/// Why the single-flight refresh failed.
///
/// The value is `Clone` so one failure can be delivered to every queued caller.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshError {
	/// Refresh endpoint answered with a non-success status.
	#[error("Refresh endpoint rejected the session with HTTP {status}: {message}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Truncated response body.
		message: String,
	},
	/// Refresh call failed before a response arrived.
	#[error("Refresh call failed: {message}.")]
	Transport {
		/// Rendered transport error.
		message: String,
	},
	/// Refresh endpoint answered 2xx without a usable access token.
	#[error("Refresh endpoint returned a malformed payload: {message}.")]
	MalformedResponse {
		/// Rendered decode error.
		message: String,
	},
	/// Refresh call exceeded the configured timeout.
	#[error("Refresh call timed out after {after:?}.")]
	TimedOut {
		/// Configured refresh timeout.
		after: Duration,
	},
	/// A login or logout replaced the session while the refresh was in flight.
	#[error("Session changed while the refresh was in flight.")]
	Superseded,
	/// The task leading the refresh was dropped before it settled.
	#[error("Refresh was abandoned before it settled.")]
	Abandoned,
}

fn truncate_preview(body: &[u8]) -> String {
	let text = String::from_utf8_lossy(body);

	if text.chars().count() <= StatusError::BODY_PREVIEW_LIMIT {
		return text.into_owned();
	}

	let mut buf = String::new();

	for (idx, ch) in text.chars().enumerate() {
		if idx >= StatusError::BODY_PREVIEW_LIMIT {
			buf.push('…');

			break;
		}

		buf.push(ch);
	}

	buf
}

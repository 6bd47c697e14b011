//! Bearer credential wrapper that redacts sensitive material.

// crates.io
use http::HeaderValue;
// self
use crate::{_prelude::*, error::ConfigError};

/// Redacted access token wrapper keeping bearer credentials out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);
impl AccessToken {
	/// Wraps a new token string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Renders the `Authorization` header value, flagged as sensitive.
	pub fn bearer_header(&self) -> Result<HeaderValue, ConfigError> {
		let mut value = HeaderValue::from_str(&format!("Bearer {}", self.0))
			.map_err(|source| ConfigError::InvalidHeader { name: "authorization", source })?;

		value.set_sensitive(true);

		Ok(value)
	}
}
impl AsRef<str> for AccessToken {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("AccessToken").field(&"<redacted>").finish()
	}
}
impl Display for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

//! Auth endpoint paths and the allow-list of routes that never trigger a token refresh.

// self
use crate::_prelude::*;

/// Paths of the API's authentication routes, relative to the base URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEndpoints {
	/// Password login.
	pub login: String,
	/// Account registration.
	pub signup: String,
	/// One-time-password verification.
	pub verify_otp: String,
	/// Cookie-authenticated token refresh.
	pub refresh: String,
	/// Server-side session termination.
	pub logout: String,
}
impl Default for AuthEndpoints {
	fn default() -> Self {
		Self {
			login: "/api/v1/auth/login".into(),
			signup: "/api/v1/auth/signup".into(),
			verify_otp: "/api/v1/auth/verify-otp".into(),
			refresh: "/api/v1/auth/refresh".into(),
			logout: "/api/v1/auth/logout".into(),
		}
	}
}
impl AuthEndpoints {
	/// Iterates over every configured path with a label, for validation.
	pub fn labeled(&self) -> [(&'static str, &str); 5] {
		[
			("login", self.login.as_str()),
			("signup", self.signup.as_str()),
			("verify_otp", self.verify_otp.as_str()),
			("refresh", self.refresh.as_str()),
			("logout", self.logout.as_str()),
		]
	}
}

/// Decides which request paths are unauthenticated and therefore never refreshed.
///
/// Matching is on the URL path only: query strings and trailing slashes are ignored, so
/// `/api/v1/auth/login/?next=/cart` matches `/api/v1/auth/login`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointPolicy {
	public: Vec<String>,
}
impl EndpointPolicy {
	/// Builds the default allow-list from the auth routes.
	///
	/// Login, signup, and OTP verification are public by definition. The refresh and logout
	/// routes are included as well: a 401 from the refresh call must never start another
	/// refresh.
	pub fn from_endpoints(endpoints: &AuthEndpoints) -> Self {
		let public = endpoints
			.labeled()
			.into_iter()
			.map(|(_, path)| normalize_path(path).to_owned())
			.collect();

		Self { public }
	}

	/// Adds another path that must never trigger a refresh.
	pub fn with_public_path(mut self, path: impl AsRef<str>) -> Self {
		let path = normalize_path(path.as_ref()).to_owned();

		if !self.public.contains(&path) {
			self.public.push(path);
		}

		self
	}

	/// Returns `true` when `path` targets an unauthenticated endpoint.
	pub fn is_public(&self, path: &str) -> bool {
		let path = normalize_path(path);

		self.public.iter().any(|candidate| candidate == path)
	}

	/// Public paths in insertion order.
	pub fn public_paths(&self) -> impl Iterator<Item = &str> {
		self.public.iter().map(String::as_str)
	}
}
impl Default for EndpointPolicy {
	fn default() -> Self {
		Self::from_endpoints(&AuthEndpoints::default())
	}
}

fn normalize_path(path: &str) -> &str {
	let path = path.split(['?', '#']).next().unwrap_or_default();
	let trimmed = path.trim_end_matches('/');

	if trimmed.is_empty() { "/" } else { trimmed }
}

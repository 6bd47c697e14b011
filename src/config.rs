//! Gateway configuration: API location, auth routes, timeouts, and storage namespace.
//!
//! Values come either from [`GatewayConfig::builder`] or from the process environment via
//! [`GatewayConfig::from_env`]. Both paths run the same validation.

// std
use std::borrow::Cow;
// self
use crate::{
	_prelude::*,
	auth::StorageNamespace,
	error::ConfigError,
	gateway::{AuthEndpoints, EndpointPolicy},
};

/// Environment variable holding the API base URL (required by [`GatewayConfig::from_env`]).
pub const BASE_URL_ENV: &str = "STOREFRONT_API_BASE_URL";
/// Environment variable overriding the storage namespace.
pub const NAMESPACE_ENV: &str = "STOREFRONT_STORAGE_NAMESPACE";
/// Environment variable overriding the refresh timeout, in whole seconds.
pub const REFRESH_TIMEOUT_ENV: &str = "STOREFRONT_REFRESH_TIMEOUT_SECS";
/// Environment variable overriding the queue timeout, in whole seconds.
pub const QUEUE_TIMEOUT_ENV: &str = "STOREFRONT_QUEUE_TIMEOUT_SECS";
/// Namespace sessions are persisted under unless configured otherwise.
pub const DEFAULT_NAMESPACE: &str = "auth-storage";

/// Validated gateway configuration.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
	/// API origin (optionally with a path prefix) every request path is appended to.
	pub base_url: Url,
	/// Auth route paths.
	pub endpoints: AuthEndpoints,
	/// Paths that never trigger a refresh.
	pub policy: EndpointPolicy,
	/// Durable storage namespace for the session.
	pub namespace: StorageNamespace,
	/// Upper bound on a single refresh call.
	pub refresh_timeout: Duration,
	/// Upper bound on how long a request waits in the refresh queue.
	pub queue_timeout: Duration,
}
impl GatewayConfig {
	/// Default bound on the refresh call.
	pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);
	/// Default bound on time spent queued behind a refresh.
	pub const DEFAULT_QUEUE_TIMEOUT: Duration = Duration::from_secs(60);

	/// Starts a builder for the API at `base_url`.
	pub fn builder(base_url: Url) -> GatewayConfigBuilder {
		GatewayConfigBuilder::new(base_url)
	}

	/// Loads configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Loads configuration through `lookup`, which maps variable names to values.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let raw_base = lookup(BASE_URL_ENV).ok_or(ConfigError::MissingEnv { name: BASE_URL_ENV })?;
		let base_url =
			Url::parse(raw_base.trim()).map_err(|source| ConfigError::InvalidBaseUrl { source })?;
		let mut builder = Self::builder(base_url);

		if let Some(namespace) = lookup(NAMESPACE_ENV) {
			builder = builder.namespace(StorageNamespace::new(namespace.trim())?);
		}
		if let Some(secs) = lookup(REFRESH_TIMEOUT_ENV) {
			builder = builder.refresh_timeout(parse_secs(REFRESH_TIMEOUT_ENV, &secs)?);
		}
		if let Some(secs) = lookup(QUEUE_TIMEOUT_ENV) {
			builder = builder.queue_timeout(parse_secs(QUEUE_TIMEOUT_ENV, &secs)?);
		}

		builder.build()
	}

	/// Resolves `path` (plus optional query pairs) against the base URL.
	///
	/// Paths are appended to the base rather than resolved per RFC 3986, so a base of
	/// `https://api.example.com/store` and a path of `/api/v1/products` yield
	/// `https://api.example.com/store/api/v1/products`.
	pub fn url_for(&self, path: &str, query: &[(String, String)]) -> Result<Url, ConfigError> {
		let base = self.base_url.as_str().trim_end_matches('/');
		let path: Cow<str> =
			if path.starts_with('/') { Cow::Borrowed(path) } else { Cow::Owned(format!("/{path}")) };
		let mut url = Url::parse(&format!("{base}{path}"))
			.map_err(|source| ConfigError::InvalidRequestUrl { path: path.to_string(), source })?;

		if !query.is_empty() {
			url.query_pairs_mut().extend_pairs(query);
		}

		Ok(url)
	}
}

/// Builder for [`GatewayConfig`] values.
#[derive(Debug)]
pub struct GatewayConfigBuilder {
	/// API base URL.
	pub base_url: Url,
	/// Auth route paths.
	pub endpoints: AuthEndpoints,
	/// Extra paths that must never trigger a refresh.
	pub extra_public_paths: Vec<String>,
	/// Storage namespace override.
	pub namespace: Option<StorageNamespace>,
	/// Refresh call timeout.
	pub refresh_timeout: Duration,
	/// Queue wait timeout.
	pub queue_timeout: Duration,
}
impl GatewayConfigBuilder {
	/// Creates a new builder seeded with the provided base URL and default routes.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			endpoints: AuthEndpoints::default(),
			extra_public_paths: Vec::new(),
			namespace: None,
			refresh_timeout: GatewayConfig::DEFAULT_REFRESH_TIMEOUT,
			queue_timeout: GatewayConfig::DEFAULT_QUEUE_TIMEOUT,
		}
	}

	/// Overrides the auth route paths.
	pub fn endpoints(mut self, endpoints: AuthEndpoints) -> Self {
		self.endpoints = endpoints;

		self
	}

	/// Marks an additional path as unauthenticated.
	pub fn public_path(mut self, path: impl Into<String>) -> Self {
		self.extra_public_paths.push(path.into());

		self
	}

	/// Overrides the storage namespace.
	pub fn namespace(mut self, namespace: StorageNamespace) -> Self {
		self.namespace = Some(namespace);

		self
	}

	/// Overrides the refresh call timeout.
	pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
		self.refresh_timeout = timeout;

		self
	}

	/// Overrides the queue wait timeout.
	pub fn queue_timeout(mut self, timeout: Duration) -> Self {
		self.queue_timeout = timeout;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<GatewayConfig, ConfigError> {
		validate_base_url(&self.base_url)?;

		for (_, path) in self.endpoints.labeled() {
			validate_path(path)?;
		}
		for path in &self.extra_public_paths {
			validate_path(path)?;
		}

		if self.refresh_timeout.is_zero() {
			return Err(ConfigError::ZeroTimeout { name: "refresh timeout" });
		}
		if self.queue_timeout.is_zero() {
			return Err(ConfigError::ZeroTimeout { name: "queue timeout" });
		}

		let policy = self
			.extra_public_paths
			.iter()
			.fold(EndpointPolicy::from_endpoints(&self.endpoints), |policy, path| {
				policy.with_public_path(path)
			});
		let namespace = match self.namespace {
			Some(namespace) => namespace,
			None => StorageNamespace::new(DEFAULT_NAMESPACE)?,
		};

		Ok(GatewayConfig {
			base_url: self.base_url,
			endpoints: self.endpoints,
			policy,
			namespace,
			refresh_timeout: self.refresh_timeout,
			queue_timeout: self.queue_timeout,
		})
	}
}

fn validate_base_url(url: &Url) -> Result<(), ConfigError> {
	if !matches!(url.scheme(), "http" | "https") {
		return Err(ConfigError::UnsupportedScheme { url: url.to_string() });
	}
	if url.cannot_be_a_base() || url.query().is_some() || url.fragment().is_some() {
		return Err(ConfigError::BaseUrlNotAPrefix { url: url.to_string() });
	}

	Ok(())
}

fn validate_path(path: &str) -> Result<(), ConfigError> {
	if path.starts_with('/') {
		Ok(())
	} else {
		Err(ConfigError::InvalidPath { path: path.to_owned() })
	}
}

fn parse_secs(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
	raw.trim()
		.parse::<u64>()
		.map(Duration::from_secs)
		.map_err(|e| ConfigError::InvalidEnv { name, reason: e.to_string() })
}

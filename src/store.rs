//! Durable session storage contracts and built-in store implementations.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{Session, StorageNamespace},
};

/// Boxed future returned by [`SessionStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for persisted sessions, keyed by namespace.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Fetches the session persisted under `namespace`, if present.
	fn load<'a>(
		&'a self,
		namespace: &'a StorageNamespace,
	) -> StoreFuture<'a, Option<PersistedSession>>;

	/// Persists or replaces the session under `namespace`.
	fn save<'a>(
		&'a self,
		namespace: &'a StorageNamespace,
		session: PersistedSession,
	) -> StoreFuture<'a, ()>;

	/// Removes the entry under `namespace`, returning what was stored.
	fn delete<'a>(
		&'a self,
		namespace: &'a StorageNamespace,
	) -> StoreFuture<'a, Option<PersistedSession>>;
}

/// Session snapshot as written to durable storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
	/// Persisted token and user.
	#[serde(flatten)]
	pub session: Session,
	/// When the entry was written.
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
}
impl PersistedSession {
	/// Stamps `session` with the current UTC instant.
	pub fn new(session: Session) -> Self {
		Self { session, updated_at: OffsetDateTime::now_utc() }
	}
}

/// Error type produced by [`SessionStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::{auth::AccessToken, error::Error};

	#[test]
	fn store_error_converts_into_gateway_error_with_source() {
		let store_error = StoreError::Backend { message: "disk full".into() };
		let gateway_error: Error = store_error.clone().into();

		assert!(matches!(gateway_error, Error::Storage(_)));
		assert!(gateway_error.to_string().contains("disk full"));

		let source = StdError::source(&gateway_error)
			.expect("Gateway error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn persisted_session_uses_flat_camel_case_layout() {
		let persisted = PersistedSession {
			session: Session::new(AccessToken::new("jwt"), None),
			updated_at: datetime!(2026-01-02 03:04:05 UTC),
		};
		let value = serde_json::to_value(&persisted).expect("Persisted session should serialize.");

		assert_eq!(value["accessToken"], "jwt");
		assert!(value["user"].is_null());
		assert_eq!(value["updatedAt"], "2026-01-02T03:04:05Z");

		let back: PersistedSession =
			serde_json::from_value(value).expect("Persisted session should deserialize.");

		assert_eq!(back, persisted);
	}
}

//! Authenticated request gateway for the storefront API: bearer attachment, single-flight token
//! refresh with ordered replay, and persisted sessions in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod obs;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::SessionState,
		config::GatewayConfig,
		gateway::ReqwestGateway,
		http::ReqwestHttpClient,
		store::{MemoryStore, SessionStore},
	};

	/// Builds a configuration pointing at `base_url` with short timeouts suited to tests.
	pub fn test_config(base_url: &str) -> GatewayConfig {
		let base_url = Url::parse(base_url).expect("Test base URL should parse.");

		GatewayConfig::builder(base_url)
			.refresh_timeout(Duration::from_secs(5))
			.queue_timeout(Duration::from_secs(5))
			.build()
			.expect("Test configuration should validate.")
	}

	/// Constructs a reqwest-backed gateway over an empty in-memory store.
	pub fn build_reqwest_test_gateway(base_url: &str) -> (ReqwestGateway, Arc<MemoryStore>) {
		let config = test_config(base_url);
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn SessionStore> = store_backend.clone();
		let session = Arc::new(SessionState::new(store, config.namespace.clone()));
		let http_client =
			ReqwestHttpClient::new().expect("Failed to build cookie-aware Reqwest client for tests.");
		let gateway = ReqwestGateway::with_http_client(config, session, http_client);

		(gateway, store_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::{HashMap, VecDeque},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use tokio_util::sync::CancellationToken;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};

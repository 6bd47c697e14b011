//! Thread-safe in-memory [`SessionStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::StorageNamespace,
	store::{PersistedSession, SessionStore, StoreFuture},
};

type StoreMap = Arc<RwLock<HashMap<StorageNamespace, PersistedSession>>>;

/// Storage backend that keeps sessions in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of namespaces currently holding a session.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no session is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl SessionStore for MemoryStore {
	fn load<'a>(
		&'a self,
		namespace: &'a StorageNamespace,
	) -> StoreFuture<'a, Option<PersistedSession>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(namespace).cloned()) })
	}

	fn save<'a>(
		&'a self,
		namespace: &'a StorageNamespace,
		session: PersistedSession,
	) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let namespace = namespace.to_owned();

		Box::pin(async move {
			map.write().insert(namespace, session);

			Ok(())
		})
	}

	fn delete<'a>(
		&'a self,
		namespace: &'a StorageNamespace,
	) -> StoreFuture<'a, Option<PersistedSession>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.write().remove(namespace)) })
	}
}

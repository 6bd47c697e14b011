//! Process-wide session state with a persistence lifecycle.
//!
//! [`SessionState`] is the single source of truth every outbound request reads its bearer
//! credential from. Mutations update the in-memory copy first and then write through to the
//! configured [`SessionStore`]; writes are serialized so the persisted entry always matches the
//! most recent mutation. On startup, [`SessionState::rehydrate`] restores whatever the previous
//! process left behind.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, StorageNamespace, UserId},
	store::{PersistedSession, SessionStore, StoreError},
};

/// Marketplace account attached to an authenticated session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
	/// Account identifier.
	pub id: UserId,
	/// Login email.
	pub email: String,
	/// Display name, when the account has one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Role label (e.g. `admin`, `buyer`).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	/// Any additional fields the API returns, preserved verbatim.
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Snapshot of the client-side session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
	/// Bearer credential attached to outbound requests.
	pub access_token: Option<AccessToken>,
	/// Signed-in account, if known.
	pub user: Option<UserProfile>,
}
impl Session {
	/// Creates an authenticated session.
	pub fn new(access_token: AccessToken, user: Option<UserProfile>) -> Self {
		Self { access_token: Some(access_token), user }
	}

	/// Returns `true` when a bearer credential is present.
	pub fn is_authenticated(&self) -> bool {
		self.access_token.is_some()
	}

	/// Returns `true` when neither a token nor a user is held.
	pub fn is_empty(&self) -> bool {
		self.access_token.is_none() && self.user.is_none()
	}
}

/// Shared session holder with write-through persistence.
///
/// Every login ([`SessionState::replace`]) and logout ([`SessionState::clear`]) starts a new
/// generation. A refresh records the generation it started under and only writes its token back
/// if no login or logout happened in between.
pub struct SessionState {
	namespace: StorageNamespace,
	store: Arc<dyn SessionStore>,
	current: RwLock<Current>,
	writes: AsyncMutex<()>,
}
impl SessionState {
	/// Creates an empty session bound to `store` under `namespace`.
	pub fn new(store: Arc<dyn SessionStore>, namespace: StorageNamespace) -> Self {
		Self {
			namespace,
			store,
			current: RwLock::new(Current::default()),
			writes: AsyncMutex::new(()),
		}
	}

	/// Restores the session persisted under `namespace`, or starts empty if none exists.
	pub async fn rehydrate(
		store: Arc<dyn SessionStore>,
		namespace: StorageNamespace,
	) -> Result<Self, StoreError> {
		let restored = store.load(&namespace).await?.map(|persisted| persisted.session);
		let state = Self::new(store, namespace);

		if let Some(session) = restored {
			state.current.write().session = session;
		}

		Ok(state)
	}

	/// Namespace the session is persisted under.
	pub fn namespace(&self) -> &StorageNamespace {
		&self.namespace
	}

	/// Returns a copy of the current session.
	pub fn snapshot(&self) -> Session {
		self.current.read().session.clone()
	}

	/// Returns the current bearer credential, if any.
	pub fn access_token(&self) -> Option<AccessToken> {
		self.current.read().session.access_token.clone()
	}

	/// Returns the signed-in account, if any.
	pub fn user(&self) -> Option<UserProfile> {
		self.current.read().session.user.clone()
	}

	/// Returns `true` when a bearer credential is present.
	pub fn is_authenticated(&self) -> bool {
		self.current.read().session.is_authenticated()
	}

	/// Counter bumped by every login and logout.
	pub fn generation(&self) -> u64 {
		self.current.read().generation
	}

	/// Replaces the whole session (login) and persists it.
	pub async fn replace(&self, session: Session) -> Result<(), StoreError> {
		let _write = self.writes.lock().await;

		self.current.write().start(session.clone());

		self.persist(session).await
	}

	/// Swaps in a refreshed token, keeping the current user, and persists the result.
	///
	/// Returns `Ok(false)` without touching anything when the session moved past `generation`.
	pub async fn set_access_token(
		&self,
		token: AccessToken,
		generation: u64,
	) -> Result<bool, StoreError> {
		let _write = self.writes.lock().await;
		let session = {
			let mut current = self.current.write();

			if current.generation != generation {
				return Ok(false);
			}

			current.session.access_token = Some(token);

			current.session.clone()
		};

		self.persist(session).await.map(|_| true)
	}

	/// Drops the token and user, deleting the persisted entry in full.
	pub async fn clear(&self) -> Result<(), StoreError> {
		let _write = self.writes.lock().await;

		self.current.write().start(Session::default());

		self.store.delete(&self.namespace).await.map(|_| ())
	}

	/// Like [`SessionState::clear`], but only while the session is still at `generation`.
	pub async fn clear_if(&self, generation: u64) -> Result<bool, StoreError> {
		let _write = self.writes.lock().await;

		{
			let mut current = self.current.write();

			if current.generation != generation {
				return Ok(false);
			}

			current.start(Session::default());
		}

		self.store.delete(&self.namespace).await.map(|_| true)
	}

	async fn persist(&self, session: Session) -> Result<(), StoreError> {
		if session.is_empty() {
			return self.store.delete(&self.namespace).await.map(|_| ());
		}

		self.store.save(&self.namespace, PersistedSession::new(session)).await
	}
}
impl Debug for SessionState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionState")
			.field("namespace", &self.namespace)
			.field("authenticated", &self.is_authenticated())
			.finish()
	}
}

#[derive(Debug, Default)]
struct Current {
	session: Session,
	generation: u64,
}
impl Current {
	fn start(&mut self, session: Session) {
		self.session = session;
		self.generation = self.generation.wrapping_add(1);
	}
}

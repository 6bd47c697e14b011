//! File-backed [`SessionStore`] for desktop and CLI clients.

// std
use std::{
	collections::BTreeMap,
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::StorageNamespace,
	store::{PersistedSession, SessionStore, StoreError, StoreFuture},
};

type Snapshot = BTreeMap<StorageNamespace, PersistedSession>;

/// Persists sessions to a JSON object (namespace → session) after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the backing JSON file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(Snapshot::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(Snapshot::new());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &Snapshot) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize session snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			restrict_permissions(&file, &tmp_path)?;
			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl SessionStore for FileStore {
	fn load<'a>(
		&'a self,
		namespace: &'a StorageNamespace,
	) -> StoreFuture<'a, Option<PersistedSession>> {
		Box::pin(async move { Ok(self.inner.read().get(namespace).cloned()) })
	}

	fn save<'a>(
		&'a self,
		namespace: &'a StorageNamespace,
		session: PersistedSession,
	) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			guard.insert(namespace.to_owned(), session);
			self.persist_locked(&guard)?;

			Ok(())
		})
	}

	fn delete<'a>(
		&'a self,
		namespace: &'a StorageNamespace,
	) -> StoreFuture<'a, Option<PersistedSession>> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let removed = guard.remove(namespace);

			if removed.is_some() {
				self.persist_locked(&guard)?;
			}

			Ok(removed)
		})
	}
}

// Session files hold bearer credentials; keep them owner-only on Unix.
#[cfg(unix)]
fn restrict_permissions(file: &File, path: &Path) -> Result<(), StoreError> {
	use std::os::unix::fs::PermissionsExt;

	file.set_permissions(fs::Permissions::from_mode(0o600)).map_err(|e| StoreError::Backend {
		message: format!("Failed to restrict permissions on {}: {e}", path.display()),
	})
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &File, _path: &Path) -> Result<(), StoreError> {
	Ok(())
}

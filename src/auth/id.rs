//! Account identifiers and storage namespaces.

// std
use std::ops::Deref;
// self
use crate::_prelude::*;

/// Identifier of a marketplace user account.
///
/// The API emits ids either as strings (`"usr_42"`) or as integers (`42`); both decode, and the
/// value is always kept and re-serialized in its string form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "WireUserId", into = "String")]
pub struct UserId(String);
impl UserId {
	/// Wraps an account id.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the id as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for UserId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Display for UserId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl From<UserId> for String {
	fn from(value: UserId) -> Self {
		value.0
	}
}
impl From<WireUserId> for UserId {
	fn from(value: WireUserId) -> Self {
		match value {
			WireUserId::Text(text) => Self(text),
			WireUserId::Number(number) => Self(number.to_string()),
		}
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireUserId {
	Text(String),
	Number(serde_json::Number),
}

/// Key a session is persisted under in durable storage.
///
/// Namespaces end up as file-store object keys and may be reused as file or key-value names, so
/// they are limited to ASCII letters, digits, and `-` `_` `.` `:`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageNamespace(String);
impl StorageNamespace {
	/// Longest accepted namespace, in bytes.
	pub const MAX_LEN: usize = 64;

	/// Validates and wraps a namespace.
	pub fn new(value: impl Into<String>) -> Result<Self, NamespaceError> {
		let value = value.into();

		if value.is_empty() {
			return Err(NamespaceError::Empty);
		}
		if value.len() > Self::MAX_LEN {
			return Err(NamespaceError::TooLong { len: value.len() });
		}
		if let Some(found) =
			value.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')))
		{
			return Err(NamespaceError::InvalidCharacter { found });
		}

		Ok(Self(value))
	}
}
impl Deref for StorageNamespace {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for StorageNamespace {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Debug for StorageNamespace {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Namespace({})", self.0)
	}
}
impl Display for StorageNamespace {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl FromStr for StorageNamespace {
	type Err = NamespaceError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl TryFrom<String> for StorageNamespace {
	type Error = NamespaceError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl From<StorageNamespace> for String {
	fn from(value: StorageNamespace) -> Self {
		value.0
	}
}

/// Why a storage namespace was rejected.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum NamespaceError {
	/// The namespace was empty.
	#[error("Storage namespace cannot be empty.")]
	Empty,
	/// The namespace is longer than [`StorageNamespace::MAX_LEN`].
	#[error("Storage namespace is {len} bytes long; the limit is {}.", StorageNamespace::MAX_LEN)]
	TooLong {
		/// Actual length in bytes.
		len: usize,
	},
	/// The namespace contains a character outside the allowed set.
	#[error("Storage namespace contains `{found}`; use ASCII letters, digits, `-`, `_`, `.`, or `:`.")]
	InvalidCharacter {
		/// First offending character.
		found: char,
	},
}

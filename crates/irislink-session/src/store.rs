//! Persisted OAuth credentials.
//!
//! The session never decides where tokens live. It is handed a
//! [`CredentialStore`], a tiny key/value capability, and reads or writes
//! a [`TokenSet`] through it under three fixed keys.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{OAuthTokens, SessionError};

// ---------------------------------------------------------------------------
// CredentialStore
// ---------------------------------------------------------------------------

/// Key/value storage for credentials.
///
/// Implementations must be cheap to call from the session task: calls
/// are synchronous and made inline.
pub trait CredentialStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError>;
    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;
    /// Removes `key`. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), SessionError>;
}

impl<S: CredentialStore + ?Sized> CredentialStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), SessionError> {
        (**self).delete(key)
    }
}

/// An in-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), SessionError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// A store backed by a JSON object in a single file.
///
/// The file is read once on [`open`](Self::open) and rewritten in full
/// on every change.
#[derive(Debug)]
pub struct JsonFileCredentialStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileCredentialStore {
    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                SessionError::Store(format!("{} is not a JSON object: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(SessionError::Store(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), SessionError> {
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| SessionError::Store(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| SessionError::Store(format!("cannot create {}: {e}", parent.display())))?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, bytes)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| SessionError::Store(format!("cannot write {}: {e}", self.path.display())))
    }
}

impl CredentialStore for JsonFileCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn delete(&self, key: &str) -> Result<(), SessionError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TokenSet
// ---------------------------------------------------------------------------

/// Milliseconds since the Unix epoch, by the wall clock.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// The OAuth tokens for one user.
///
/// Loaded all-or-nothing: a store holding only some of the keys, or an
/// unparseable expiry, counts as no tokens at all.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry of `access_token`, in Unix milliseconds.
    pub expires_at: u64,
}

impl TokenSet {
    pub const ACCESS_TOKEN_KEY: &'static str = "access_token";
    pub const REFRESH_TOKEN_KEY: &'static str = "refresh_token";
    pub const EXPIRES_AT_KEY: &'static str = "expires_at";

    /// Builds a set from a token endpoint response received at `now_ms`.
    pub fn from_grant(tokens: OAuthTokens, now_ms: u64) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: now_ms.saturating_add(tokens.expires_in.saturating_mul(1000)),
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }

    /// Reads the set from `store`, or `None` if it is absent or partial.
    pub fn load<S: CredentialStore + ?Sized>(store: &S) -> Result<Option<Self>, SessionError> {
        let access = store.get(Self::ACCESS_TOKEN_KEY)?.filter(|s| !s.is_empty());
        let refresh = store.get(Self::REFRESH_TOKEN_KEY)?.filter(|s| !s.is_empty());
        let expires = store
            .get(Self::EXPIRES_AT_KEY)?
            .and_then(|s| s.trim().parse::<u64>().ok());

        match (access, refresh, expires) {
            (Some(access_token), Some(refresh_token), Some(expires_at)) => Ok(Some(Self {
                access_token,
                refresh_token,
                expires_at,
            })),
            (None, None, None) => Ok(None),
            _ => {
                tracing::debug!("stored credentials are incomplete, ignoring them");
                Ok(None)
            }
        }
    }

    pub fn persist<S: CredentialStore + ?Sized>(&self, store: &S) -> Result<(), SessionError> {
        store.set(Self::ACCESS_TOKEN_KEY, &self.access_token)?;
        store.set(Self::REFRESH_TOKEN_KEY, &self.refresh_token)?;
        store.set(Self::EXPIRES_AT_KEY, &self.expires_at.to_string())
    }

    /// Deletes every key of the set, attempting all three even if one
    /// fails. Returns the first failure.
    pub fn clear<S: CredentialStore + ?Sized>(store: &S) -> Result<(), SessionError> {
        let results = [
            store.delete(Self::ACCESS_TOKEN_KEY),
            store.delete(Self::REFRESH_TOKEN_KEY),
            store.delete(Self::EXPIRES_AT_KEY),
        ];
        results.into_iter().collect()
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TokenSet {
        TokenSet {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: 1_000,
        }
    }

    #[test]
    fn test_token_set_persist_then_load_returns_same_set() {
        let store = MemoryCredentialStore::new();
        sample().persist(&store).unwrap();

        assert_eq!(TokenSet::load(&store).unwrap(), Some(sample()));
    }

    #[test]
    fn test_token_set_load_partial_set_is_absent() {
        let store = MemoryCredentialStore::new();
        store.set(TokenSet::ACCESS_TOKEN_KEY, "access").unwrap();
        store.set(TokenSet::EXPIRES_AT_KEY, "99").unwrap();

        assert_eq!(TokenSet::load(&store).unwrap(), None);
    }

    #[test]
    fn test_token_set_load_empty_value_is_absent() {
        let store = MemoryCredentialStore::new();
        sample().persist(&store).unwrap();
        store.set(TokenSet::REFRESH_TOKEN_KEY, "").unwrap();

        assert_eq!(TokenSet::load(&store).unwrap(), None);
    }

    #[test]
    fn test_token_set_load_unparseable_expiry_is_absent() {
        let store = MemoryCredentialStore::new();
        sample().persist(&store).unwrap();
        store.set(TokenSet::EXPIRES_AT_KEY, "soon").unwrap();

        assert_eq!(TokenSet::load(&store).unwrap(), None);
    }

    #[test]
    fn test_token_set_clear_removes_all_keys() {
        let store = MemoryCredentialStore::new();
        sample().persist(&store).unwrap();

        TokenSet::clear(&store).unwrap();

        assert!(store.is_empty());
    }

    #[test]
    fn test_token_set_from_grant_converts_seconds_to_millis() {
        let tokens = OAuthTokens {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_in: 604_800,
        };
        let set = TokenSet::from_grant(tokens, 10_000);
        assert_eq!(set.expires_at, 10_000 + 604_800_000);
        assert!(!set.is_expired(10_000));
        assert!(set.is_expired(set.expires_at));
    }

    #[test]
    fn test_token_set_debug_redacts_tokens() {
        let set = TokenSet {
            access_token: "s3cr3t-access".to_string(),
            refresh_token: "s3cr3t-refresh".to_string(),
            expires_at: 1,
        };
        assert!(!format!("{set:?}").contains("s3cr3t"));
    }

    #[test]
    fn test_json_file_store_survives_reopen() {
        let suffix: u64 = rand::random();
        let path = std::env::temp_dir()
            .join(format!("irislink-store-{suffix:x}"))
            .join("credentials.json");

        let store = JsonFileCredentialStore::open(&path).unwrap();
        sample().persist(&store).unwrap();
        drop(store);

        let reopened = JsonFileCredentialStore::open(&path).unwrap();
        assert_eq!(TokenSet::load(&reopened).unwrap(), Some(sample()));

        TokenSet::clear(&reopened).unwrap();
        let emptied = JsonFileCredentialStore::open(&path).unwrap();
        assert_eq!(TokenSet::load(&emptied).unwrap(), None);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_json_file_store_missing_file_is_empty() {
        let path = std::env::temp_dir().join("irislink-store-does-not-exist.json");
        let store = JsonFileCredentialStore::open(path).unwrap();
        assert_eq!(store.get(TokenSet::ACCESS_TOKEN_KEY).unwrap(), None);
    }
}

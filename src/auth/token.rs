//! Persistent user token storage.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AuthScope;

/// Tokens are treated as expired this long before Twitch says so.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// User token as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredToken {
    /// OAuth access token (without the `oauth:` prefix).
    pub access_token: String,

    /// Refresh token used to obtain a new access token.
    pub refresh_token: String,

    /// Scopes granted to the token.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// When the token was obtained.
    pub obtained_at: DateTime<Utc>,

    /// When the access token stops being valid, if known.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Creates a stored token from a fresh token grant.
    #[must_use]
    pub fn new(
        access_token: String,
        refresh_token: String,
        scopes: Vec<String>,
        expires_in_secs: Option<i64>,
    ) -> Self {
        let obtained_at = Utc::now();
        Self {
            access_token,
            refresh_token,
            scopes,
            obtained_at,
            expires_at: expires_in_secs.map(|secs| obtained_at + Duration::seconds(secs)),
        }
    }

    /// Checks if the access token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|expires| now + Duration::seconds(EXPIRY_MARGIN_SECS) >= expires)
    }

    /// Checks if the access token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Checks if every requested scope was granted.
    #[must_use]
    pub fn covers(&self, requested: &[AuthScope]) -> bool {
        requested
            .iter()
            .all(|scope| self.scopes.iter().any(|granted| granted == scope.as_str()))
    }
}

/// JSON file holding the user token between runs.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Creates a store backed by the given file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored token, returns `None` if missing or unreadable.
    pub fn load(&self) -> Option<StoredToken> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("No stored token at {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(token) => Some(token),
            Err(e) => {
                debug!("Ignoring malformed token file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Saves the token as JSON, readable by the owner only on Unix.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn save(&self, token: &StoredToken) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(token)?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;

        // `mode` only applies on creation; tighten files left by older runs.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(json.as_bytes())?;
        file.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::USER_SCOPES;

    fn all_scopes() -> Vec<String> {
        USER_SCOPES.iter().map(|s| s.as_str().to_owned()).collect()
    }

    #[test]
    fn test_token_without_expiry_never_expires() {
        let token = StoredToken::new("a".to_owned(), "r".to_owned(), vec![], None);
        assert!(!token.is_expired());
    }

    #[test]
    fn test_token_expiry() {
        let token = StoredToken::new("a".to_owned(), "r".to_owned(), vec![], Some(3600));
        assert!(!token.is_expired());
        assert!(token.is_expired_at(token.obtained_at + Duration::seconds(3600)));
        // Inside the safety margin counts as expired.
        assert!(token.is_expired_at(token.obtained_at + Duration::seconds(3590)));
    }

    #[test]
    fn test_scope_coverage() {
        let full = StoredToken::new("a".to_owned(), "r".to_owned(), all_scopes(), None);
        assert!(full.covers(&USER_SCOPES));

        let partial = StoredToken::new(
            "a".to_owned(),
            "r".to_owned(),
            vec!["chat:read".to_owned()],
            None,
        );
        assert!(partial.covers(&[AuthScope::ChatRead]));
        assert!(!partial.covers(&USER_SCOPES));
    }

    #[test]
    fn test_store_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("user_token.json"));
        assert!(store.load().is_none());

        let token = StoredToken::new("a".to_owned(), "r".to_owned(), all_scopes(), Some(100));
        store.save(&token).unwrap();

        assert_eq!(store.load(), Some(token));
    }

    #[cfg(unix)]
    #[test]
    fn test_store_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_token.json");
        let token = StoredToken::new("a".to_owned(), "r".to_owned(), all_scopes(), None);

        TokenStore::new(&path).save(&token).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        // A readable file from an earlier run is tightened before the write.
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        TokenStore::new(&path).save(&token).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_store_ignores_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_token.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(TokenStore::new(path).load().is_none());
    }
}

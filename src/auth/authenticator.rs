//! OAuth authorization code flow against the Twitch identity service.

use std::fmt;

use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{AuthScope, StoredToken, TokenStore};
use crate::config::TwitchConfig;

/// Twitch identity service serving the `/oauth2/*` endpoints.
const DEFAULT_ID_URL: &str = "https://id.twitch.tv";

/// Errors that can occur while authenticating.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token rejected by Twitch: {0}")]
    TokenRejected(String),

    #[error("Granted token is missing scopes: {0}")]
    MissingScopes(String),

    #[error("Invalid authorization URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to store token: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of validating an access token.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenInfo {
    /// Client ID the token was issued to.
    pub client_id: String,

    /// Login name of the token owner.
    pub login: String,

    /// User ID of the token owner.
    pub user_id: String,

    /// Scopes granted to the token.
    #[serde(default)]
    pub scopes: Option<Vec<String>>,

    /// Seconds until the token expires.
    #[serde(default)]
    pub expires_in: i64,
}

/// Authenticated chat identity.
#[derive(Clone)]
pub struct UserSession {
    /// Login name used as the chat nickname.
    pub login: String,

    /// Twitch user ID.
    pub user_id: String,

    /// Access token for the chat connection.
    pub access_token: String,
}

impl fmt::Debug for UserSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSession")
            .field("login", &self.login)
            .field("user_id", &self.user_id)
            .field("access_token", &"***")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Twitch API client for obtaining user tokens.
pub struct Authenticator {
    http: Client,
    base_url: String,
    app_id: String,
    app_secret: String,
    redirect_uri: String,
    scopes: Vec<AuthScope>,
}

impl Authenticator {
    /// Creates an authenticator requesting the given scopes.
    #[must_use]
    pub fn new(config: &TwitchConfig, scopes: &[AuthScope]) -> Self {
        Self {
            http: Client::new(),
            base_url: DEFAULT_ID_URL.to_owned(),
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: scopes.to_vec(),
        }
    }

    /// Points the OAuth endpoints at another identity service.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Returns the URL the operator opens to grant the bot access.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidUrl`] if the base URL does not parse.
    pub fn authorization_url(&self) -> Result<String, AuthError> {
        let url = Url::parse_with_params(
            &self.endpoint("authorize"),
            &[
                ("client_id", self.app_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", self.scope_list().as_str()),
                ("force_verify", "true"),
            ],
        )
        .map_err(|e| AuthError::InvalidUrl(e.to_string()))?;

        Ok(url.into())
    }

    /// Restores a session from the token store.
    ///
    /// Returns `Ok(None)` when an interactive login is required.
    ///
    /// # Errors
    ///
    /// Returns an error if Twitch cannot be reached, answers with an
    /// unexpected status, or the refreshed token cannot be saved.
    pub async fn restore(&self, store: &TokenStore) -> Result<Option<UserSession>, AuthError> {
        let Some(stored) = store.load() else {
            info!("No stored user token, login required");
            return Ok(None);
        };

        if !stored.covers(&self.scopes) {
            info!("Stored token lacks requested scopes, login required");
            return Ok(None);
        }

        if !stored.is_expired() {
            match self.validate(&stored.access_token).await {
                Ok(info) => return Ok(Some(session_from(info, stored.access_token))),
                Err(AuthError::TokenRejected(reason)) => {
                    debug!("Stored access token rejected: {}", reason);
                }
                Err(e) => return Err(e),
            }
        }

        info!("Refreshing user token...");
        let refreshed = match self.refresh(&stored.refresh_token).await {
            Ok(token) => token,
            Err(AuthError::TokenRejected(reason)) => {
                warn!("Refresh token rejected ({}), login required", reason);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        store.save(&refreshed)?;
        let info = self.validate(&refreshed.access_token).await?;
        Ok(Some(session_from(info, refreshed.access_token)))
    }

    /// Completes a login with the code returned to the redirect URI.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingScopes`] if the grant lacks a requested
    /// scope, [`AuthError::TokenRejected`] if the code is refused, and
    /// HTTP or file errors as they occur.
    pub async fn login(&self, code: &str, store: &TokenStore) -> Result<UserSession, AuthError> {
        let token = self.exchange_code(code).await?;

        if !token.covers(&self.scopes) {
            return Err(AuthError::MissingScopes(token.scopes.join(" ")));
        }

        store.save(&token)?;
        info!("Stored user token at {}", store.path().display());

        let info = self.validate(&token.access_token).await?;
        Ok(session_from(info, token.access_token))
    }

    /// Exchanges an authorization code for a user token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenRejected`] if Twitch refuses the code.
    pub async fn exchange_code(&self, code: &str) -> Result<StoredToken, AuthError> {
        debug!("Exchanging authorization code...");

        let response = self
            .http
            .post(self.endpoint("token"))
            .form(&[
                ("client_id", self.app_id.as_str()),
                ("client_secret", self.app_secret.as_str()),
                ("code", code.trim()),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        let grant: TokenGrant = read_json(response).await?;
        Ok(grant.into_stored())
    }

    /// Obtains a new access token with a refresh token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenRejected`] if the refresh token is no
    /// longer accepted.
    pub async fn refresh(&self, refresh_token: &str) -> Result<StoredToken, AuthError> {
        let response = self
            .http
            .post(self.endpoint("token"))
            .form(&[
                ("client_id", self.app_id.as_str()),
                ("client_secret", self.app_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let grant: TokenGrant = read_json(response).await?;
        Ok(grant.into_stored())
    }

    /// Validates an access token and returns its owner.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenRejected`] if the token is invalid or was
    /// issued to another application.
    pub async fn validate(&self, access_token: &str) -> Result<TokenInfo, AuthError> {
        let response = self
            .http
            .get(self.endpoint("validate"))
            .header("Authorization", format!("OAuth {access_token}"))
            .send()
            .await?;

        let info: TokenInfo = read_json(response).await?;
        if info.client_id != self.app_id {
            return Err(AuthError::TokenRejected(
                "token was issued to a different application".to_owned(),
            ));
        }

        debug!(
            "Token valid for {} ({}s remaining)",
            info.login, info.expires_in
        );
        Ok(info)
    }

    /// Releases the HTTP client.
    pub fn close(self) {
        info!("Closing Twitch API client...");
        drop(self.http);
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/oauth2/{name}", self.base_url)
    }

    fn scope_list(&self) -> String {
        self.scopes
            .iter()
            .map(|scope| scope.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl TokenGrant {
    fn into_stored(self) -> StoredToken {
        StoredToken::new(
            self.access_token,
            self.refresh_token,
            self.scope,
            self.expires_in,
        )
    }
}

fn session_from(info: TokenInfo, access_token: String) -> UserSession {
    UserSession {
        login: info.login,
        user_id: info.user_id,
        access_token,
    }
}

/// Decodes a JSON body, mapping 400/401 answers to [`AuthError::TokenRejected`].
async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, AuthError> {
    let status = response.status();

    if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
        let body: ErrorBody = response.json().await.unwrap_or(ErrorBody {
            message: status.to_string(),
        });
        return Err(AuthError::TokenRejected(body.message));
    }

    Ok(response.error_for_status()?.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::USER_SCOPES;

    fn authenticator() -> Authenticator {
        let config = TwitchConfig::new("my-app".to_owned(), "my-secret".to_owned());
        Authenticator::new(&config, &USER_SCOPES)
    }

    #[test]
    fn test_authorization_url() {
        let url = authenticator().authorization_url().unwrap();
        let parsed = Url::parse(&url).unwrap();

        assert_eq!(parsed.host_str(), Some("id.twitch.tv"));
        assert_eq!(parsed.path(), "/oauth2/authorize");

        let params: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert!(params.contains(&("client_id".to_owned(), "my-app".to_owned())));
        assert!(params.contains(&("response_type".to_owned(), "code".to_owned())));
        assert!(params.contains(&(
            "redirect_uri".to_owned(),
            "http://localhost:17563".to_owned()
        )));
        assert!(params.contains(&(
            "scope".to_owned(),
            "chat:read chat:edit whispers:read channel:read:redemptions".to_owned()
        )));
        assert!(!url.contains("my-secret"));
    }

    #[test]
    fn test_base_url_override() {
        let authenticator = authenticator().with_base_url("http://127.0.0.1:9/");
        assert_eq!(authenticator.endpoint("token"), "http://127.0.0.1:9/oauth2/token");
        assert!(
            authenticator
                .authorization_url()
                .unwrap()
                .starts_with("http://127.0.0.1:9/oauth2/authorize?")
        );
    }

    fn all_scopes() -> Vec<String> {
        USER_SCOPES.iter().map(|s| s.as_str().to_owned()).collect()
    }

    fn validate_body(client_id: &str) -> String {
        format!(
            r#"{{"client_id":"{client_id}","login":"cowbot","user_id":"42","scopes":["chat:read"],"expires_in":5000}}"#
        )
    }

    fn stored_token(dir: &tempfile::TempDir, token: &StoredToken) -> TokenStore {
        let store = TokenStore::new(dir.path().join("user_token.json"));
        store.save(token).unwrap();
        store
    }

    #[tokio::test]
    async fn test_restore_valid_token() {
        let mut server = mockito::Server::new_async().await;
        let validate = server
            .mock("GET", "/oauth2/validate")
            .match_header("authorization", "OAuth stored-access")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(validate_body("my-app"))
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let token = StoredToken::new(
            "stored-access".to_owned(),
            "stored-refresh".to_owned(),
            all_scopes(),
            Some(3600),
        );
        let store = stored_token(&dir, &token);

        let session = authenticator()
            .with_base_url(server.url())
            .restore(&store)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(session.login, "cowbot");
        assert_eq!(session.user_id, "42");
        assert_eq!(session.access_token, "stored-access");
        validate.assert_async().await;
    }

    #[tokio::test]
    async fn test_restore_refreshes_expired_token() {
        let mut server = mockito::Server::new_async().await;
        let refresh = server
            .mock("POST", "/oauth2/token")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                mockito::Matcher::UrlEncoded("refresh_token".into(), "stored-refresh".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token":"new-access","refresh_token":"new-refresh","expires_in":14400,
                    "scope":["chat:read","chat:edit","whispers:read","channel:read:redemptions"],
                    "token_type":"bearer"}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let validate = server
            .mock("GET", "/oauth2/validate")
            .match_header("authorization", "OAuth new-access")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(validate_body("my-app"))
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let token = StoredToken::new(
            "stored-access".to_owned(),
            "stored-refresh".to_owned(),
            all_scopes(),
            Some(-10),
        );
        let store = stored_token(&dir, &token);

        let session = authenticator()
            .with_base_url(server.url())
            .restore(&store)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(session.access_token, "new-access");
        let saved = store.load().unwrap();
        assert_eq!(saved.access_token, "new-access");
        assert_eq!(saved.refresh_token, "new-refresh");
        assert!(!saved.is_expired());
        refresh.assert_async().await;
        validate.assert_async().await;
    }

    #[tokio::test]
    async fn test_restore_rejected_refresh_needs_login() {
        let mut server = mockito::Server::new_async().await;
        let refresh = server
            .mock("POST", "/oauth2/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":400,"message":"Invalid refresh token"}"#)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let token = StoredToken::new(
            "stored-access".to_owned(),
            "stored-refresh".to_owned(),
            all_scopes(),
            Some(-10),
        );
        let store = stored_token(&dir, &token);

        let restored = authenticator()
            .with_base_url(server.url())
            .restore(&store)
            .await
            .unwrap();

        assert!(restored.is_none());
        assert_eq!(store.load(), Some(token));
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_restore_missing_scopes_needs_login() {
        // No mocks: any request would fail the restore with an HTTP error.
        let server = mockito::Server::new_async().await;

        let dir = tempfile::tempdir().unwrap();
        let token = StoredToken::new(
            "stored-access".to_owned(),
            "stored-refresh".to_owned(),
            vec!["chat:read".to_owned()],
            Some(3600),
        );
        let store = stored_token(&dir, &token);

        let restored = authenticator()
            .with_base_url(server.url())
            .restore(&store)
            .await
            .unwrap();

        assert!(restored.is_none());
    }

    #[tokio::test]
    async fn test_validate_rejects_other_client_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/oauth2/validate")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(validate_body("other-app"))
            .create_async()
            .await;

        let result = authenticator()
            .with_base_url(server.url())
            .validate("some-token")
            .await;

        assert!(matches!(result, Err(AuthError::TokenRejected(_))));
    }

    #[tokio::test]
    async fn test_validate_unauthorized_is_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/oauth2/validate")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":401,"message":"invalid access token"}"#)
            .create_async()
            .await;

        let result = authenticator()
            .with_base_url(server.url())
            .validate("expired-token")
            .await;

        match result {
            Err(AuthError::TokenRejected(reason)) => assert_eq!(reason, "invalid access token"),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_session_debug_hides_token() {
        let session = UserSession {
            login: "bot".to_owned(),
            user_id: "1".to_owned(),
            access_token: "supersecret".to_owned(),
        };
        let rendered = format!("{session:?}");
        assert!(rendered.contains("bot"));
        assert!(!rendered.contains("supersecret"));
    }

    #[test]
    fn test_grant_into_stored() {
        let grant: TokenGrant = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","expires_in":3600,
                "scope":["chat:read","chat:edit"],"token_type":"bearer"}"#,
        )
        .unwrap();
        let stored = grant.into_stored();

        assert_eq!(stored.access_token, "a");
        assert_eq!(stored.refresh_token, "r");
        assert!(stored.expires_at.is_some());
        assert!(stored.covers(&[AuthScope::ChatRead, AuthScope::ChatEdit]));
    }
}

//! Auth provider for RESO Web API requests
//!
//! Produces the `Authorization` header either from a static bearer token or
//! from an OAuth2 client-credentials grant. Client-credentials tokens are
//! refreshed in place once they expire.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tokio::sync::Mutex;

use super::models::{ClientCredentials, Credentials, TokenResponse};
use crate::error::AuthError;

/// Token state held by an initialized provider
#[derive(Debug, Clone)]
struct AuthState {
    bearer_token: String,
    client_credentials: Option<ClientCredentials>,
    token_type: Option<String>,
    token_expires_at: Option<DateTime<Utc>>,
}

impl AuthState {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.token_expires_at {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }
}

/// Auth provider scoped to one credential set.
///
/// Must be initialized with [`AuthProvider::init`] exactly once before
/// [`AuthProvider::access_token`] or [`AuthProvider::auth_headers`] are used.
#[derive(Debug)]
pub struct AuthProvider {
    http: reqwest::Client,
    state: Mutex<Option<AuthState>>,
}

impl AuthProvider {
    /// Create an uninitialized provider that uses `http` for token requests
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            state: Mutex::new(None),
        }
    }

    /// Initialize with the given credentials.
    ///
    /// For client credentials the first token is fetched immediately so bad
    /// credentials fail before any data request is made.
    pub async fn init(&self, credentials: Credentials) -> Result<(), AuthError> {
        let mut guard = self.state.lock().await;
        if guard.is_some() {
            return Err(AuthError::AlreadyInitialized);
        }

        let state = match credentials {
            Credentials::BearerToken(token) => {
                if token.trim().is_empty() {
                    return Err(AuthError::MissingToken {
                        token_uri: "<static bearer token>".to_string(),
                    });
                }
                debug!("Auth provider initialized with static bearer token");
                AuthState {
                    bearer_token: token,
                    client_credentials: None,
                    token_type: Some("Bearer".to_string()),
                    token_expires_at: None,
                }
            }
            Credentials::ClientCredentials(client_credentials) => {
                let state = self.fetch_token(&client_credentials).await?;
                info!(
                    "Auth provider initialized with client credentials from {}",
                    client_credentials.token_uri
                );
                state
            }
        };

        *guard = Some(state);
        Ok(())
    }

    /// Return a valid access token, refreshing it first when expired
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let mut guard = self.state.lock().await;
        let state = guard.as_mut().ok_or(AuthError::NotInitialized)?;

        if state.is_expired(Utc::now()) {
            if let Some(client_credentials) = state.client_credentials.clone() {
                info!("Access token expired, requesting a new one");
                *state = self.fetch_token(&client_credentials).await?;
            }
        }

        Ok(state.bearer_token.clone())
    }

    /// Build the `Authorization: Bearer <token>` header map
    pub async fn auth_headers(&self) -> Result<HeaderMap, AuthError> {
        let token = self.access_token().await?;
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| AuthError::InvalidHeader)?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    /// Token type reported by the token endpoint, if any
    pub async fn token_type(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .as_ref()
            .and_then(|s| s.token_type.clone())
    }

    /// Whether [`AuthProvider::init`] has completed successfully
    pub async fn is_initialized(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// Drop all token state. The provider must be initialized again before use.
    pub async fn reset(&self) {
        *self.state.lock().await = None;
    }

    async fn fetch_token(&self, credentials: &ClientCredentials) -> Result<AuthState, AuthError> {
        let mut form = vec![("grant_type", "client_credentials".to_string())];
        if let Some(scope) = credentials.scope.as_ref().filter(|s| !s.is_empty()) {
            form.push(("scope", scope.clone()));
        }

        debug!("Requesting access token from {}", credentials.token_uri);

        let response = self
            .http
            .post(&credentials.token_uri)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&form)
            .send()
            .await
            .map_err(|source| AuthError::TokenRequest {
                token_uri: credentials.token_uri.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenRejected {
                token_uri: credentials.token_uri.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await.map_err(|source| AuthError::TokenRequest {
            token_uri: credentials.token_uri.clone(),
            source,
        })?;

        let access_token = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::MissingToken {
                token_uri: credentials.token_uri.clone(),
            })?;

        // Lifetimes too large to represent never expire
        let token_expires_at = token
            .expires_in
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));

        Ok(AuthState {
            bearer_token: access_token,
            client_credentials: Some(credentials.clone()),
            token_type: token.token_type,
            token_expires_at,
        })
    }
}

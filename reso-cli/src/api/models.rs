//! Wire models for the RESO Web API and its token endpoint

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// OAuth2 client-credentials settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub token_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Credentials used to authorize data requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Static bearer token, used verbatim for the whole run
    BearerToken(String),
    /// OAuth2 client-credentials grant with automatic refresh
    ClientCredentials(ClientCredentials),
}

impl Credentials {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::BearerToken(token.into())
    }

    pub fn client_credentials(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_uri: impl Into<String>,
        scope: Option<String>,
    ) -> Self {
        Self::ClientCredentials(ClientCredentials {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_uri: token_uri.into(),
            scope,
        })
    }
}

/// Response body of a client-credentials token request
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    /// Lifetime in seconds; some servers send it as a numeric string
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Accept `3600` or `"3600"`; anything else counts as no expiry
fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_response_tolerates_missing_fields() {
        let token: TokenResponse =
            serde_json::from_value(json!({"token_type": "Bearer"})).unwrap();
        assert!(token.access_token.is_none());
        assert_eq!(token.token_type.as_deref(), Some("Bearer"));
    }

    #[test]
    fn test_token_response_accepts_string_lifetime() {
        let token: TokenResponse = serde_json::from_value(json!({
            "access_token": "t",
            "expires_in": "3599",
            "token_type": "Bearer"
        }))
        .unwrap();
        assert_eq!(token.expires_in, Some(3599));

        let token: TokenResponse =
            serde_json::from_value(json!({"access_token": "t", "expires_in": "soon"})).unwrap();
        assert!(token.expires_in.is_none());

        let token: TokenResponse =
            serde_json::from_value(json!({"access_token": "t", "expires_in": 3600})).unwrap();
        assert_eq!(token.expires_in, Some(3600));
    }
}

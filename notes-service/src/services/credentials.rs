//! Service-account credentials and the OAuth2 access tokens derived from them.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Scopes required to read and write the realtime database.
const DATABASE_SCOPES: &str =
    "https://www.googleapis.com/auth/firebase.database https://www.googleapis.com/auth/userinfo.email";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("failed to read credentials file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse credentials: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid service account private key: {0}")]
    InvalidKey(jsonwebtoken::errors::Error),

    #[error("failed to sign token assertion: {0}")]
    Signing(jsonwebtoken::errors::Error),

    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Where the database credentials come from.
#[derive(Debug, Clone)]
pub enum CredentialsSource {
    /// Unauthenticated access (emulator or open security rules).
    None,
    /// A service-account JSON key on disk.
    File(PathBuf),
    /// A key assembled from discrete settings.
    Fields(ServiceAccountKey),
}

impl CredentialsSource {
    pub fn resolve(&self) -> Result<Option<ServiceAccountKey>, CredentialsError> {
        match self {
            CredentialsSource::None => Ok(None),
            CredentialsSource::File(path) => ServiceAccountKey::from_file(path).map(Some),
            CredentialsSource::Fields(key) => Ok(Some(key.clone())),
        }
    }
}

/// Google service-account key, in the layout of the downloadable JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub key_type: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: String,
    pub private_key: Secret<String>,
    pub client_email: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub auth_provider_x509_cert_url: String,
    #[serde(default)]
    pub client_x509_cert_url: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self, CredentialsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CredentialsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CredentialsError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Exchanges a service-account key for bearer tokens and caches them.
///
/// Callers share one mutex, so at most one refresh is in flight and everyone
/// else waits for its result.
pub struct ServiceAccountTokenSource {
    client_email: String,
    token_uri: String,
    key_id: String,
    encoding_key: EncodingKey,
    http: Client,
    cached: Mutex<Option<AccessToken>>,
}

impl ServiceAccountTokenSource {
    pub fn new(key: &ServiceAccountKey, http: Client) -> Result<Self, CredentialsError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.expose_secret().as_bytes())
            .map_err(CredentialsError::InvalidKey)?;

        Ok(Self {
            client_email: key.client_email.clone(),
            token_uri: key.token_uri.clone(),
            key_id: key.private_key_id.clone(),
            encoding_key,
            http,
            cached: Mutex::new(None),
        })
    }

    pub async fn access_token(&self) -> Result<String, CredentialsError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        let token = self.fetch_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    fn sign_assertion(&self, now: DateTime<Utc>) -> Result<String, CredentialsError> {
        let mut header = Header::new(Algorithm::RS256);
        if !self.key_id.is_empty() {
            header.kid = Some(self.key_id.clone());
        }

        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: DATABASE_SCOPES,
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };

        encode(&header, &claims, &self.encoding_key).map_err(CredentialsError::Signing)
    }

    async fn fetch_token(&self) -> Result<AccessToken, CredentialsError> {
        let now = Utc::now();
        let assertion = self.sign_assertion(now)?;

        tracing::debug!(client_email = %self.client_email, "Requesting database access token");

        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status, "Token endpoint rejected service account assertion");
            return Err(CredentialsError::Rejected { status, body });
        }

        let token: TokenResponse = response.json().await?;

        Ok(AccessToken {
            value: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_KEY: &str = r#"{
        "type": "service_account",
        "private_key": "not-a-pem",
        "client_email": "svc@example.iam.gserviceaccount.com"
    }"#;

    #[test]
    fn parses_minimal_key_with_default_token_uri() {
        let key = ServiceAccountKey::from_json(MINIMAL_KEY).unwrap();
        assert_eq!(key.key_type, "service_account");
        assert_eq!(key.client_email, "svc@example.iam.gserviceaccount.com");
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
        assert_eq!(key.project_id, "");
    }

    #[test]
    fn key_without_client_email_is_rejected() {
        let err = ServiceAccountKey::from_json(r#"{"private_key": "x"}"#).unwrap_err();
        assert!(matches!(err, CredentialsError::Parse(_)));
    }

    #[test]
    fn debug_output_redacts_private_key() {
        let key = ServiceAccountKey::from_json(MINIMAL_KEY).unwrap();
        assert!(!format!("{:?}", key).contains("not-a-pem"));
    }

    #[test]
    fn malformed_pem_is_reported() {
        let key = ServiceAccountKey::from_json(MINIMAL_KEY).unwrap();
        let result = ServiceAccountTokenSource::new(&key, Client::new());
        assert!(matches!(result, Err(CredentialsError::InvalidKey(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let source = CredentialsSource::File(PathBuf::from("/nonexistent/service-account.json"));
        assert!(matches!(source.resolve(), Err(CredentialsError::Io { .. })));
    }

    #[test]
    fn none_source_resolves_to_no_key() {
        assert!(CredentialsSource::None.resolve().unwrap().is_none());
    }
}

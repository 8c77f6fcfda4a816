use crate::services::credentials::{CredentialsSource, ServiceAccountKey, DEFAULT_TOKEN_URI};
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NotesConfig {
    pub common: core_config::Config,
    pub store: StoreConfig,
    pub firebase: FirebaseConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Root path of the notes collection in the database tree.
    pub collection: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firebase,
    Memory,
}

#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub database_url: String,
    /// `ns` query parameter, needed when talking to the database emulator.
    pub namespace: Option<String>,
    pub credentials: CredentialsSource,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_headers: vec!["*".to_string()],
        }
    }
}

impl NotesConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let backend: StoreBackend = get_env("STORE_BACKEND", Some("firebase"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let database_url = match backend {
            StoreBackend::Firebase => get_env("DATABASE_URL", None, is_prod)?,
            StoreBackend::Memory => env::var("DATABASE_URL").unwrap_or_default(),
        };

        let request_timeout_secs: u64 =
            get_env("FIREBASE_REQUEST_TIMEOUT_SECS", Some("30"), is_prod)?
                .parse()
                .map_err(|e| {
                    AppError::ConfigError(anyhow::anyhow!(
                        "FIREBASE_REQUEST_TIMEOUT_SECS is not a number: {}",
                        e
                    ))
                })?;

        Ok(NotesConfig {
            common: common_config,
            store: StoreConfig {
                backend,
                collection: get_env("NOTES_COLLECTION", Some("notes"), is_prod)?,
            },
            firebase: FirebaseConfig {
                database_url,
                namespace: env::var("FIREBASE_DATABASE_NAMESPACE").ok(),
                credentials: load_credentials(backend, is_prod, |key| env::var(key).ok())?,
                request_timeout: Duration::from_secs(request_timeout_secs),
            },
            cors: CorsConfig {
                allowed_origins: split_list(&get_env("CORS_ALLOWED_ORIGINS", Some("*"), is_prod)?),
                allowed_headers: split_list(&get_env("CORS_ALLOWED_HEADERS", Some("*"), is_prod)?),
            },
        })
    }
}

/// Pick the credential source: a key file wins over discrete fields, and
/// running without credentials is only allowed outside production.
fn load_credentials(
    backend: StoreBackend,
    is_prod: bool,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<CredentialsSource, AppError> {
    if backend == StoreBackend::Memory {
        return Ok(CredentialsSource::None);
    }

    if let Some(path) = lookup("FIREBASE_CREDENTIALS_FILE") {
        return Ok(CredentialsSource::File(PathBuf::from(path)));
    }

    if let Some(private_key) = lookup("FIREBASE_PRIVATE_KEY") {
        let field = |key: &str| lookup(key).unwrap_or_default();
        return Ok(CredentialsSource::Fields(ServiceAccountKey {
            key_type: field("FIREBASE_TYPE"),
            project_id: field("FIREBASE_PROJECT_ID"),
            private_key_id: field("FIREBASE_PRIVATE_KEY_ID"),
            private_key: Secret::new(unescape_newlines(&private_key)),
            client_email: field("FIREBASE_CLIENT_EMAIL"),
            client_id: field("FIREBASE_CLIENT_ID"),
            auth_uri: field("FIREBASE_AUTH_URI"),
            token_uri: lookup("FIREBASE_TOKEN_URI")
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            auth_provider_x509_cert_url: field("FIREBASE_AUTH_PROVIDER_X509_CERT_URL"),
            client_x509_cert_url: field("FIREBASE_CLIENT_X509_CERT_URL"),
        }));
    }

    if is_prod {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "FIREBASE_CREDENTIALS_FILE or FIREBASE_PRIVATE_KEY is required in production"
        )));
    }

    tracing::warn!("No Firebase credentials configured, requests will be unauthenticated");
    Ok(CredentialsSource::None)
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "firebase" => Ok(StoreBackend::Firebase),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}

/// Env files commonly carry PEM keys on one line with literal `\n`.
fn unescape_newlines(value: &str) -> String {
    value.replace("\\n", "\n")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

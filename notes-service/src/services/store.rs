use crate::models::Note;
use crate::services::credentials::CredentialsError;
use crate::services::push_id::PushIdGenerator;
use async_trait::async_trait;
use service_core::error::AppError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("http error status: {status}; reason: {message}")]
    Status { status: u16, message: String },

    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode database response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid database url: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

/// The notes collection in whatever backs it.
///
/// Every method is a single independent operation; implementations provide no
/// ordering or atomicity beyond what their backend gives per key.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Mint a fresh, time-ordered key. Never touches the backend.
    fn generate_key(&self) -> String;

    async fn list(&self) -> Result<BTreeMap<String, Note>, StoreError>;

    /// `Ok(None)` when the key is absent.
    async fn get(&self, id: &str) -> Result<Option<Note>, StoreError>;

    /// Create or fully replace the note stored under `id`.
    async fn set(&self, id: &str, note: &Note) -> Result<(), StoreError>;

    /// Remove `id`. Succeeds whether or not it existed.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// In-process store for tests and local development.
pub struct MemoryNoteStore {
    notes: RwLock<BTreeMap<String, Note>>,
    ids: PushIdGenerator,
    available: AtomicBool,
}

impl Default for MemoryNoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self {
            notes: RwLock::new(BTreeMap::new()),
            ids: PushIdGenerator::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Make every subsequent operation fail, or recover.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.notes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.notes.read().await.is_empty()
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable(
                "memory store is switched off".to_string(),
            ))
        }
    }
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    fn generate_key(&self) -> String {
        self.ids.generate()
    }

    async fn list(&self) -> Result<BTreeMap<String, Note>, StoreError> {
        self.ensure_available()?;
        Ok(self.notes.read().await.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<Note>, StoreError> {
        self.ensure_available()?;
        Ok(self.notes.read().await.get(id).cloned())
    }

    async fn set(&self, id: &str, note: &Note) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.notes
            .write()
            .await
            .insert(id.to_string(), note.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.notes.write().await.remove(id);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.ensure_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str, title: &str) -> Note {
        Note {
            id: id.to_string(),
            title: title.to_string(),
            content: String::new(),
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = MemoryNoteStore::new();
        let key = store.generate_key();
        store.set(&key, &note(&key, "first")).await.unwrap();

        assert_eq!(store.get(&key).await.unwrap(), Some(note(&key, "first")));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_replaces_existing_value() {
        let store = MemoryNoteStore::new();
        store.set("k", &note("k", "old")).await.unwrap();
        store.set("k", &note("k", "new")).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("k").await.unwrap().unwrap().title, "new");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryNoteStore::new();
        store.set("k", &note("k", "t")).await.unwrap();

        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn list_is_ordered_by_key() {
        let store = MemoryNoteStore::new();
        let first = store.generate_key();
        let second = store.generate_key();
        store.set(&second, &note(&second, "b")).await.unwrap();
        store.set(&first, &note(&first, "a")).await.unwrap();

        let keys: Vec<_> = store.list().await.unwrap().into_keys().collect();
        assert_eq!(keys, vec![first, second]);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_operation() {
        let store = MemoryNoteStore::new();
        store.set_available(false);

        assert!(matches!(store.list().await, Err(StoreError::Unavailable(_))));
        assert!(store.get("k").await.is_err());
        assert!(store.set("k", &note("k", "t")).await.is_err());
        assert!(store.delete("k").await.is_err());
        assert!(store.health_check().await.is_err());

        store.set_available(true);
        assert!(store.health_check().await.is_ok());
    }

    #[test]
    fn status_error_message_keeps_backend_reason() {
        let err = StoreError::Status {
            status: 401,
            message: "Permission denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "http error status: 401; reason: Permission denied"
        );
    }
}

//! REST client for the realtime database and the note store built on it.
//!
//! Every path `a/b/c` maps to `{base}/a/b/c.json`: GET reads the subtree
//! (`null` when absent), PUT replaces it, DELETE removes it.

use crate::config::FirebaseConfig;
use crate::models::Note;
use crate::services::credentials::ServiceAccountTokenSource;
use crate::services::push_id::PushIdGenerator;
use crate::services::store::{NoteStore, StoreError};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct RealtimeDbClient {
    http: Client,
    base_url: Url,
    namespace: Option<String>,
    auth: Option<Arc<ServiceAccountTokenSource>>,
}

/// Error body the database sends alongside non-2xx statuses.
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl RealtimeDbClient {
    /// Build a client from configuration, resolving credentials up front so
    /// that a bad key fails startup rather than the first request.
    pub fn from_config(config: &FirebaseConfig) -> Result<Self, StoreError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;

        let auth = match config.credentials.resolve()? {
            Some(key) => {
                tracing::info!(
                    project_id = %key.project_id,
                    client_email = %key.client_email,
                    "Using service account credentials"
                );
                Some(Arc::new(ServiceAccountTokenSource::new(&key, http.clone())?))
            }
            None => None,
        };

        Self::new(
            http,
            &config.database_url,
            config.namespace.clone(),
            auth,
        )
    }

    pub fn new(
        http: Client,
        database_url: &str,
        namespace: Option<String>,
        auth: Option<Arc<ServiceAccountTokenSource>>,
    ) -> Result<Self, StoreError> {
        let base_url = Url::parse(database_url)
            .map_err(|e| StoreError::InvalidUrl(format!("{}: {}", database_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(database_url.to_string()));
        }

        Ok(Self {
            http,
            base_url,
            namespace,
            auth,
        })
    }

    pub(crate) fn url(&self, path: &[&str], shallow: bool) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::InvalidUrl(self.base_url.to_string()))?;
            segments.pop_if_empty();
            match path.split_last() {
                Some((last, parents)) => {
                    segments.extend(parents);
                    segments.push(&format!("{}.json", last));
                }
                None => {
                    segments.push(".json");
                }
            }
        }

        if let Some(ns) = &self.namespace {
            url.query_pairs_mut().append_pair("ns", ns);
        }
        if shallow {
            url.query_pairs_mut().append_pair("shallow", "true");
        }

        Ok(url)
    }

    async fn request(
        &self,
        method: Method,
        path: &[&str],
        shallow: bool,
    ) -> Result<RequestBuilder, StoreError> {
        let url = self.url(path, shallow)?;
        let mut request = self.http.request(method, url);
        if let Some(auth) = &self.auth {
            request = request.bearer_auth(auth.access_token().await?);
        }
        Ok(request)
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|e| e.error)
            .unwrap_or(body);

        Err(StoreError::Status {
            status: status.as_u16(),
            message,
        })
    }

    /// Read the value at `path`; `None` when nothing is stored there.
    pub async fn get<T: DeserializeOwned>(&self, path: &[&str]) -> Result<Option<T>, StoreError> {
        let response = self.request(Method::GET, path, false).await?.send().await?;
        let bytes = Self::check(response).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Replace whatever is stored at `path` with `value`.
    pub async fn set<T: Serialize + ?Sized>(&self, path: &[&str], value: &T) -> Result<(), StoreError> {
        let response = self
            .request(Method::PUT, path, false)
            .await?
            .json(value)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &[&str]) -> Result<(), StoreError> {
        let response = self
            .request(Method::DELETE, path, false)
            .await?
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Cheap reachability probe: a shallow read returns only child keys.
    pub async fn ping(&self, path: &[&str]) -> Result<(), StoreError> {
        let response = self.request(Method::GET, path, true).await?.send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// Notes kept as children of one collection node in the realtime database.
pub struct RealtimeNoteStore {
    db: RealtimeDbClient,
    collection: Vec<String>,
    ids: PushIdGenerator,
}

impl RealtimeNoteStore {
    pub fn new(db: RealtimeDbClient, collection: &str) -> Self {
        Self {
            db,
            collection: collection
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            ids: PushIdGenerator::new(),
        }
    }

    fn collection_path(&self) -> Vec<&str> {
        self.collection.iter().map(String::as_str).collect()
    }

    fn note_path<'a>(&'a self, id: &'a str) -> Vec<&'a str> {
        let mut path = self.collection_path();
        path.push(id);
        path
    }
}

#[async_trait]
impl NoteStore for RealtimeNoteStore {
    fn generate_key(&self) -> String {
        self.ids.generate()
    }

    async fn list(&self) -> Result<BTreeMap<String, Note>, StoreError> {
        let notes = self.db.get(&self.collection_path()).await?;
        Ok(notes.unwrap_or_default())
    }

    async fn get(&self, id: &str) -> Result<Option<Note>, StoreError> {
        self.db.get(&self.note_path(id)).await
    }

    async fn set(&self, id: &str, note: &Note) -> Result<(), StoreError> {
        self.db.set(&self.note_path(id), note).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.db.delete(&self.note_path(id)).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.db.ping(&self.collection_path()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str, namespace: Option<&str>) -> RealtimeDbClient {
        RealtimeDbClient::new(Client::new(), base, namespace.map(str::to_string), None).unwrap()
    }

    #[test]
    fn builds_json_paths() {
        let db = client("https://notes-test.firebaseio.com", None);
        assert_eq!(
            db.url(&["notes", "-Nabc"], false).unwrap().as_str(),
            "https://notes-test.firebaseio.com/notes/-Nabc.json"
        );
        assert_eq!(
            db.url(&["notes"], false).unwrap().as_str(),
            "https://notes-test.firebaseio.com/notes.json"
        );
    }

    #[test]
    fn tolerates_trailing_slash_in_base_url() {
        let db = client("https://notes-test.firebaseio.com/", None);
        assert_eq!(
            db.url(&["notes"], false).unwrap().as_str(),
            "https://notes-test.firebaseio.com/notes.json"
        );
    }

    #[test]
    fn percent_encodes_path_segments() {
        let db = client("http://localhost:9000", None);
        assert_eq!(
            db.url(&["notes", "a b?c"], false).unwrap().as_str(),
            "http://localhost:9000/notes/a%20b%3Fc.json"
        );
    }

    #[test]
    fn appends_namespace_and_shallow_flags() {
        let db = client("http://localhost:9000", Some("notes-test"));
        assert_eq!(
            db.url(&["notes"], true).unwrap().as_str(),
            "http://localhost:9000/notes.json?ns=notes-test&shallow=true"
        );
    }

    #[test]
    fn rejects_unusable_database_url() {
        assert!(matches!(
            RealtimeDbClient::new(Client::new(), "not a url", None, None),
            Err(StoreError::InvalidUrl(_))
        ));
        assert!(matches!(
            RealtimeDbClient::new(Client::new(), "mailto:ops@example.com", None, None),
            Err(StoreError::InvalidUrl(_))
        ));
    }

    #[test]
    fn nested_collection_paths_are_split() {
        let store = RealtimeNoteStore::new(client("http://localhost:9000", None), "/apps/notes/");
        assert_eq!(store.note_path("k"), vec!["apps", "notes", "k"]);
    }
}

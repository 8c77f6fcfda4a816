#![allow(dead_code)]

use notes_service::config::{CorsConfig, FirebaseConfig, NotesConfig, StoreBackend, StoreConfig};
use notes_service::services::{CredentialsSource, MemoryNoteStore};
use notes_service::startup::Application;
use service_core::config::Config as CoreConfig;
use std::sync::Arc;
use std::time::Duration;

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub store: Arc<MemoryNoteStore>,
    pub client: reqwest::Client,
}

pub fn test_config() -> NotesConfig {
    NotesConfig {
        common: CoreConfig { port: 0 }, // Random port
        store: StoreConfig {
            backend: StoreBackend::Memory,
            collection: "notes".to_string(),
        },
        firebase: FirebaseConfig {
            database_url: String::new(),
            namespace: None,
            credentials: CredentialsSource::None,
            request_timeout: Duration::from_secs(5),
        },
        cors: CorsConfig::default(),
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(test_config()).await
    }

    pub async fn spawn_with_config(config: NotesConfig) -> Self {
        let store = Arc::new(MemoryNoteStore::new());

        let app = Application::build_with_store(config, store.clone())
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            store,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn create_note(&self, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url("/notes"))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get_note(&self, id: &str) -> reqwest::Response {
        self.client
            .get(self.url(&format!("/notes/{}", id)))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn list_notes(&self) -> reqwest::Response {
        self.client
            .get(self.url("/notes"))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn update_note(&self, id: &str, body: serde_json::Value) -> reqwest::Response {
        self.client
            .put(self.url(&format!("/notes/{}", id)))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete_note(&self, id: &str) -> reqwest::Response {
        self.client
            .delete(self.url(&format!("/notes/{}", id)))
            .send()
            .await
            .expect("Failed to execute request")
    }
}

pub mod credentials;
pub mod metrics;
pub mod push_id;
pub mod realtime_db;
pub mod store;

pub use credentials::{CredentialsError, CredentialsSource, ServiceAccountKey, ServiceAccountTokenSource};
pub use metrics::{get_metrics, init_metrics, record_operation};
pub use push_id::PushIdGenerator;
pub use realtime_db::{RealtimeDbClient, RealtimeNoteStore};
pub use store::{MemoryNoteStore, NoteStore, StoreError};

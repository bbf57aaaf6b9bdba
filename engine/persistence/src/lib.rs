//! # Persistence Layer
//!
//! This crate provides the storage used by the league history collector.
//! Collected entities are written through an idempotent keyed sink, and crawl
//! progress is kept durable with an append-only journal plus compaction
//! snapshots.
//!
//! ## Architecture
//!
//! - **RecordSink**: Abstract trait for keyed, idempotent entity storage
//! - **LocalRecordStore**: One JSON document per entity, written atomically
//! - **InMemoryRecordStore**: Test backend
//! - **Journal**: JSON-lines log of state transitions
//! - **Snapshots**: Compacted state for fast recovery
//!
//! ## Usage
//!
//! ```rust
//! use persistence::{create_local_store, EntityKey, RecordSink, UpsertOutcome};
//! use tempfile::TempDir;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let temp_dir = TempDir::new()?;
//!     let store = create_local_store(temp_dir.path())?;
//!     store.initialize().await?;
//!
//!     let key = EntityKey::parse("league/42/season/2021/team/5")?;
//!     let data = serde_json::json!({ "name": "Gridiron Gang" });
//!     assert_eq!(store.upsert(&key, "team", data.clone()).await?, UpsertOutcome::Inserted);
//!     assert_eq!(store.upsert(&key, "team", data).await?, UpsertOutcome::Unchanged);
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod journal;
pub mod local;
pub mod record;
pub mod snapshot;

pub use backend::{InMemoryRecordStore, LocalRecordStore, RecordSink};
pub use config::{JournalConfig, PersistenceConfig, SnapshotConfig};
pub use error::{PersistenceError, Result};
pub use journal::{Journal, JournalEntry};
pub use local::{create_local_store, create_local_store_with_config};
pub use record::{EntityKey, StoredRecord, UpsertOutcome};
pub use snapshot::{Snapshot, SnapshotManager};

//! # KyroStore - Uniform Object Storage
//!
//! KyroStore puts one key/value interface in front of four storage backends:
//! an embedded dictionary file, a directory of files, a cloud object service,
//! and a key-value/queue service. Values are encoded with their content type
//! so a `get` hands back what was `put`.
//!
//! ## Core Concepts
//!
//! - **Store**: a handle on `(bucket, prefix)` in one backend
//! - **Namespace**: the bucket and `/`-joined prefix every key is placed under
//! - **Codec**: maps values to bytes plus a content type and back
//! - **Collections**: named sets and queues, native on the kv service
//! - **Factory**: builds stores from layered YAML profiles
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kyrostore::{ObjectStore, StoreFactory, Value};
//!
//! let factory = StoreFactory::new();
//! let store = factory.open("default")?;
//!
//! let sessions = store.sub(&["sessions", "42"])?;
//! sessions.put("messages", Value::from_serialize(&messages)?.into())?;
//!
//! for key in store.list("sessions/", false)? {
//!     println!("{}", key?);
//! }
//!
//! let jobs = store.queue("jobs", Some(1000))?;
//! jobs.push(&"reindex".into())?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod codec;
pub mod error;
pub mod namespace;
pub mod value;

// Backends and collections
pub mod collection;
pub mod storage;
pub mod store;

// Configuration
pub mod config;
pub mod factory;
pub mod memo;
pub mod pool;

// Re-export primary types at crate root for convenience
pub use collection::{GenericQueue, GenericSet};
pub use config::{BackendConfig, BackendKind, Settings};
pub use error::{ConfigError, StoreError, StoreResult};
pub use factory::{StoreFactory, StoreSpec};
pub use memo::Memo;
pub use namespace::Namespace;
pub use pool::ConnectionPool;
pub use storage::{Keys, ObjectQueue, ObjectSet, ObjectStore};
pub use store::Store;
pub use value::{BinaryObject, Payload, Value};

//! The Memory service: durable storage for episodic events and heuristics,
//! the Bayesian confidence rule, and the warm-read matching cache that
//! fronts the persistent store.

pub mod cache;
pub mod client;
pub mod confidence;
pub mod config;
pub mod domain;
pub mod embedding_provider;
pub mod postgres_store;
pub mod server;
pub mod store;

pub use config::Config;
pub use server::MemoryService;
pub use store::{InMemoryStore, PersistentStore, StoreError, StoreResult};

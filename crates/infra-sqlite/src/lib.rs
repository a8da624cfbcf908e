// Gatekeeper Infrastructure - SQLite Adapter
// Implements: KeyValueStore (locks + counters), JobQueue

mod connection;
mod error;
mod job_queue;
mod kv_store;
mod migration;

pub use connection::create_pool;
pub use job_queue::SqliteJobQueue;
pub use kv_store::SqliteKeyValueStore;
pub use migration::run_migrations;

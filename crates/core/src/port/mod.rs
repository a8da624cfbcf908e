// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod job_handler;
pub mod job_queue;
pub mod key_value_store;
pub mod time_provider;

// Re-exports
pub use id_provider::IdProvider;
pub use job_handler::JobHandler;
pub use job_queue::JobQueue;
pub use key_value_store::KeyValueStore;
pub use time_provider::TimeProvider;

// Application Layer - Admission control use cases

pub mod concurrency;
pub mod coordinator;
pub mod keys;
pub mod lock;
pub mod throttler;
pub mod throughput;
pub mod worker;

// Re-exports
pub use concurrency::ConcurrencyCounter;
pub use coordinator::ReservationCoordinator;
pub use keys::ThrottleKeys;
pub use lock::DistributedLock;
pub use throttler::{ThrottleStatus, Throttler};
pub use throughput::ThroughputCounter;
pub use worker::{shutdown_channel, JobOutcome, ShutdownSender, ShutdownToken, Worker};

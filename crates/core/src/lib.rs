// Gatekeeper Core - Admission control domain, ports and use cases
// NO infrastructure dependencies: the store and the job queue are ports

pub mod application;
pub mod domain;
pub mod error;
pub mod port;
pub mod settings;

pub use error::{AppError, Result};

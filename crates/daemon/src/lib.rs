//! Process host for the Shardvault control plane: configuration loading,
//! tracing setup, backend construction and the reclamation worker.

pub mod config;
pub mod error;
pub mod factory;
pub mod telemetry;
pub mod worker;

pub use config::DaemonConfig;
pub use error::DaemonError;
pub use worker::Reclaimer;

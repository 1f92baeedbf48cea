//! Orchestration of the Shardvault control plane: upload admission and
//! commit, deletion across both schema generations, download resolution and
//! quota administration.

pub mod builder;
pub mod config;
pub mod deletion;
pub mod download;
pub mod error;
pub mod ledger;
pub mod quota;
pub mod selector;
pub mod upload;

pub use builder::{ControlPlane, ControlPlaneBuilder};
pub use config::{NodeSelectionPolicy, UploadPolicy};
pub use deletion::DeletionEngine;
pub use download::{DownloadResolver, ShardLocation};
pub use error::{ControlError, ErrorKind};
pub use ledger::QuotaLedger;
pub use quota::QuotaAdmin;
pub use selector::{NodeSelector, pick_node};
pub use upload::{AdmittedShard, UploadOrchestrator, WriteTarget};

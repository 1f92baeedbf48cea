//! Client for the HTTP surface exposed by storage nodes.
//!
//! The control plane only ever talks to nodes through [`NodeClient`], so the
//! orchestration code can be exercised against [`testing::FakeNodeClient`].

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod testing;
pub mod urls;

pub use client::{MultipartTarget, NodeClient};
pub use config::{NodeClientConfig, NodeCredentials};
pub use error::NodeError;
pub use http::HttpNodeClient;

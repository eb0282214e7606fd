//! # Triply Client
//!
//! [`BookingGateway`](triply_core::gateway::BookingGateway) over the Triply
//! REST API.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use triply_client::{ClientConfig, TriplyClient};
//! use triply_core::session::SessionStore;
//!
//! # fn main() -> Result<(), triply_core::error::GatewayError> {
//! let session = SessionStore::new();
//! let client = TriplyClient::new(ClientConfig::from_env(), session)?;
//! let gateway: Arc<dyn triply_core::gateway::BookingGateway> = Arc::new(client);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;

pub use client::TriplyClient;
pub use config::ClientConfig;

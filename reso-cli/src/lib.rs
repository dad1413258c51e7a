//! Replication client and data availability scoring for RESO Web API servers

pub mod api;
pub mod availability;
pub mod cli;
pub mod config;
pub mod error;
pub mod replication;

pub use error::{AuthError, ReplicationError, Result};

//! Core types for runner-fleet.
//!
//! This crate provides the foundational types shared across the workspace:
//!
//! - **Identifiers**: Validated IDs for pools and runner instances
//! - **Runner model**: Runner snapshots with their provider and service status
//!
//! # Example
//!
//! ```
//! use fleet_core::{PoolId, ProviderStatus, ServiceStatus};
//!
//! let pool_id: PoolId = "8ec6b1a4-5d3c-4d8f-9c58-0a6f4bba7d11".parse().unwrap();
//! assert_eq!(pool_id.as_str(), "8ec6b1a4-5d3c-4d8f-9c58-0a6f4bba7d11");
//!
//! assert!(ProviderStatus::Running.is_deletable());
//! assert!(ServiceStatus::Idle.is_idle());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ids;
pub mod runner;

pub use ids::{IdError, PoolId, RunnerId, RunnerName};
pub use runner::{ProviderStatus, Runner, ServiceStatus};

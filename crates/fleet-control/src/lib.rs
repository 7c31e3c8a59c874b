//! Idle-runner alignment for runner service pools.
//!
//! This crate decides which idle runners of a pool can go and deletes them
//! through the shared session:
//!
//! - [`fetch_pool_runners`] lists the current runners of a pool
//! - [`IdleAlignment`] turns a snapshot and a [`PoolPolicy`] into a deletion
//!   set without doing any I/O
//! - [`delete_runners`] deletes the set, one independent attempt per runner
//! - [`PoolAligner`] chains the three into a pass and repeats it on an
//!   interval
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        PoolAligner                          │
//! │  ┌─────────────┐   ┌──────────────┐   ┌─────────────────┐   │
//! │  │  Snapshot   │──▶│  Alignment   │──▶│    Deletion     │   │
//! │  │  fetcher    │   │  (pure)      │   │    executor     │   │
//! │  └──────┬──────┘   └──────────────┘   └────────┬────────┘   │
//! └─────────┼──────────────────────────────────────┼────────────┘
//!           │                                      │
//!           ▼                                      ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              SessionManager (ensure_auth)                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use std::time::Duration;
//! use chrono::Utc;
//! use fleet_control::{compute_deletion_set, PoolPolicy};
//!
//! let policy = PoolPolicy::new(2, Duration::from_secs(600));
//! let to_delete = compute_deletion_set(&[], &policy, Utc::now());
//! assert!(to_delete.is_empty());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod alignment;
pub mod error;
pub mod executor;
pub mod fetcher;
pub mod service;
pub mod types;

pub use alignment::{compute_deletion_set, AlignmentPlan, IdleAlignment};
pub use error::{ControlError, Result};
pub use executor::delete_runners;
pub use fetcher::fetch_pool_runners;
pub use service::PoolAligner;
pub use types::{
    AlignmentOutcome, ControlConfig, DeletionFailure, DeletionReport, PoolPolicy, PoolTarget,
};

// Re-export commonly used types from dependencies for convenience
pub use fleet_core::{PoolId, Runner, RunnerName};

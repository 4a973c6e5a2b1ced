//! Matchforge - matchmaking-function orchestrator
//!
//! Matchforge drains a queue of pending match-profile requests from shared
//! state storage, launches one containerized matchmaking function (MMF) per
//! request as a Kubernetes batch Job, and periodically launches an evaluator
//! Job that reconciles the competing match proposals those workers produce.
//!
//! The whole system is a single control loop. Each tick pops profile IDs
//! from the profile queue, fans out fire-and-forget worker launches, and
//! decides whether the evaluator should run: either the configured interval
//! has elapsed, or every worker launched since the last evaluator run has
//! finished. Evaluation is gated on the proposal queue being non-empty.
//!
//! # Modules
//!
//! - [`config`] - YAML configuration with defaults for every option
//! - [`store`] - shared state storage access (Redis behind a pooled client)
//! - [`job`] - Kubernetes Job descriptor construction and job naming
//! - [`submit`] - Job submission against the cluster API
//! - [`profile`] - profile ID parsing and image resolution from payloads
//! - [`launcher`] - fire-and-forget worker and evaluator launch tasks
//! - [`orchestrator`] - the control loop and its evaluator trigger
//! - [`metrics`] - launch counters and the log-line severity counter
//! - [`error`] - error types for the orchestrator

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod job;
pub mod launcher;
pub mod metrics;
pub mod orchestrator;
pub mod profile;
pub mod store;
pub mod submit;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

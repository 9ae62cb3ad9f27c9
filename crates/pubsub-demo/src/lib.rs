//! # Pub/Sub Demo Library
//!
//! This library exposes the demo's modules for integration testing.
//!
//! - **[model]**: the setup context and the queue policy document
//! - **[setup]**: the five setup steps
//! - **[broker]**: an in-memory SNS/SQS stand-in
//! - **[lifecycle]**: configuration and the [`Orchestrator`](lifecycle::Orchestrator)

pub mod broker;
pub mod lifecycle;
pub mod model;
pub mod setup;

//! # Lifecycle & Orchestration
//!
//! The [`Orchestrator`] is the conductor of the demo. The individual pieces
//! (setup steps, poll loop, publish gate) are simple; ordering them correctly is
//! where the care goes.
//!
//! ## Run Order
//!
//! 1. **Setup** - spawn the five setup steps and wait on their completion signal.
//!    A failed step aborts the run here; the poll loop is never started.
//! 2. **Consume** - start the [`PollDrainLoop`](pubsub_flow::PollDrainLoop) in
//!    the background.
//! 3. **Publish** - send `message_count` messages through a
//!    [`PublishGate`](pubsub_flow::PublishGate), one at a time.
//! 4. **Stop** - set the stop flag.
//! 5. **Drain** - wait until the loop has seen an empty batch after the stop and
//!    every acknowledgment has settled.
//!
//! ```rust,ignore
//! let provider = Arc::new(InMemoryBroker::new(config.broker.clone()));
//! let report = Orchestrator::new(provider, config).run().await?;
//! info!(published = report.published, received = report.drain.received, "Done");
//! ```
//!
//! The orchestrator only waits in three places: the setup signal, each publish,
//! and the drain signal. Everything else runs on spawned tasks.
//!
//! ## Configuration
//!
//! See [`config::AppConfig`] for the knobs and how they are loaded.

pub mod config;
pub mod orchestrator;

pub use config::{AppConfig, ConfigError};
pub use orchestrator::{Orchestrator, RunReport};

//! # Step Sequencer
//!
//! Chains dependent setup steps so that each one starts only after the previous
//! one succeeded. Steps share a context value `C` that the sequencer threads
//! through by `&mut` reference: a step reads what earlier steps wrote and writes
//! what later steps need.
//!
//! ## Ordering
//!
//! Steps run one after another on the same task. Step *i+1* is not even
//! constructed into a future until step *i* has returned, so two steps are never
//! in flight at the same time.
//!
//! ## Failure
//!
//! The first failing step ends the sequence. Later steps are never invoked and
//! the caller receives [`FlowError::StepFailed`] naming the step and its 1-based
//! position.
//!
//! ```rust
//! use pubsub_flow::sequencer::{PipelineStep, StepSequencer};
//! use pubsub_flow::StepError;
//! use async_trait::async_trait;
//!
//! struct Append(&'static str);
//!
//! #[async_trait]
//! impl PipelineStep<Vec<&'static str>> for Append {
//!     fn name(&self) -> &'static str { self.0 }
//!     async fn execute(&self, ctx: &mut Vec<&'static str>) -> Result<(), StepError> {
//!         ctx.push(self.0);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let sequence = StepSequencer::new().then(Append("first")).then(Append("second"));
//!     let mut ctx = Vec::new();
//!     sequence.run(&mut ctx).await.unwrap();
//!     assert_eq!(ctx, vec!["first", "second"]);
//! }
//! ```

use crate::error::{FlowError, StepError};
use crate::signal::{self, SignalWaiter};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument, Span};

/// One unit of setup work.
///
/// A step performs a single provider operation and records its result in the
/// shared context. It holds no state of its own between runs.
#[async_trait]
pub trait PipelineStep<C>: Send + Sync {
    /// Stable name used in logs and errors.
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &mut C) -> Result<(), StepError>;
}

/// An ordered list of steps executed strictly in sequence.
pub struct StepSequencer<C> {
    steps: Vec<Box<dyn PipelineStep<C>>>,
}

impl<C: Send> Default for StepSequencer<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send> StepSequencer<C> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Appends a step, builder style.
    pub fn then(mut self, step: impl PipelineStep<C> + 'static) -> Self {
        self.push(step);
        self
    }

    pub fn push(&mut self, step: impl PipelineStep<C> + 'static) {
        self.steps.push(Box::new(step));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Runs every step in order against `ctx`.
    pub async fn run(&self, ctx: &mut C) -> Result<(), FlowError> {
        let total = self.steps.len();
        let started = Instant::now();

        for (index, step) in self.steps.iter().enumerate() {
            let position = index + 1;
            let name = step.name();
            let span = info_span!("setup_step", step = name, position);

            let outcome = async {
                info!("Starting");
                step.execute(ctx).await
            }
            .instrument(span)
            .await;

            if let Err(source) = outcome {
                warn!(step = name, position, total, error = %source, "Setup step failed");
                return Err(FlowError::StepFailed {
                    position,
                    step: name,
                    source,
                });
            }
        }

        info!(steps = total, elapsed = ?started.elapsed(), "Setup sequence complete");
        Ok(())
    }
}

impl<C: Send + 'static> StepSequencer<C> {
    /// Runs the sequence on its own task.
    ///
    /// The returned signal resolves with the finished context, or with the error
    /// of the step that failed. The task runs inside the caller's current span.
    pub fn spawn(self, mut ctx: C) -> SignalWaiter<Result<C, FlowError>> {
        let (resolver, waiter) = signal::channel("setup");
        tokio::spawn(
            async move {
                let outcome = self.run(&mut ctx).await.map(|()| ctx);
                resolver.resolve(outcome);
            }
            .instrument(Span::current()),
        );
        waiter
    }
}

//! # Observability & Tracing
//!
//! [`setup_tracing`] installs a `tracing-subscriber` formatter for binaries built on
//! this crate. Library code only emits events; it never installs a subscriber.
//!
//! ## Configuration
//!
//! Levels come from `RUST_LOG`. The output is compact and omits the module
//! prefix (`with_target(false)`), so each line is the span path, the message and
//! its structured fields.
//!
//! ```bash
//! # Setup progress, every received message, drain summary
//! RUST_LOG=info cargo run -p pubsub-demo
//!
//! # Also acknowledgments, retries and signal resolution
//! RUST_LOG=debug cargo run -p pubsub-demo
//! ```
//!
//! ## What Gets Traced
//!
//! - **Setup**: one `setup_step` span per step, carrying `step` and `position`
//! - **Poll loop**: a `poll_loop` span with `queue`; state changes, each
//!   `Message received`, and the final drain report
//! - **Publishing**: a `publish` span per call with `topic` and `sequence`
//! - **Failures**: `warn!` for recoverable ones (a failed acknowledgment),
//!   `error!` for those that end the loop
//!
//! ```text
//! INFO setup_step: Starting step="create_topic" position=1
//! INFO Setup sequence complete steps=5 elapsed=1.2ms
//! INFO poll_loop: Message received queue=https://sqs.us-east-1.amazonaws.com/000000000000/demo message_id=... body="message: 1"
//! INFO poll_loop: Poll loop state changed from=Running to=Draining batch_len=4
//! INFO poll_loop: Poll loop drained batches=57 received=100 acknowledged=100 ack_failures=0
//! ```
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}

//! # Pub/Sub Demo
//!
//! Creates a topic and a queue, routes the topic into the queue, publishes a
//! numbered sequence of messages and consumes them until the queue is drained.
//!
//! Runs against [`InMemoryBroker`]. Configuration comes from the TOML file named
//! by `PUBSUB_DEMO_CONFIG`; see [`AppConfig`] for the fields.

use pubsub_demo::broker::InMemoryBroker;
use pubsub_demo::lifecycle::{AppConfig, Orchestrator};
use pubsub_flow::tracing::setup_tracing;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let config = AppConfig::load().map_err(|e| {
        error!(error = %e, "Configuration rejected");
        e.to_string()
    })?;
    info!(
        topic = %config.topic_name,
        queue = %config.queue_name,
        messages = config.message_count,
        "Starting pub/sub demo"
    );

    let provider = Arc::new(InMemoryBroker::new(config.broker.clone()));
    let report = Orchestrator::new(provider, config)
        .run()
        .await
        .map_err(|e| {
            error!(error = %e, "Run failed");
            e.to_string()
        })?;

    info!(
        published = report.published,
        received = report.drain.received,
        acknowledged = report.drain.acknowledged,
        ack_failures = report.drain.ack_failures,
        "Demo finished"
    );
    Ok(())
}

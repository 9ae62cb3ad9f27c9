use crate::lifecycle::config::AppConfig;
use crate::model::SharedContext;
use crate::setup::setup_sequence;
use pubsub_flow::{DrainReport, FlowError, Message, MessagingProvider, PollDrainLoop, PublishGate};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

/// Outcome of a complete run.
#[derive(Debug)]
pub struct RunReport {
    pub context: SharedContext,
    pub published: u64,
    pub drain: DrainReport,
}

/// Drives setup, publishing and the drain-aware shutdown against one provider.
pub struct Orchestrator<P> {
    provider: Arc<P>,
    config: AppConfig,
    handler: Option<Arc<dyn Fn(&Message) + Send + Sync>>,
}

impl<P: MessagingProvider> Orchestrator<P> {
    pub fn new(provider: Arc<P>, config: AppConfig) -> Self {
        Self {
            provider,
            config,
            handler: None,
        }
    }

    /// Installs a callback the poll loop invokes for every received message.
    pub fn with_message_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Runs the setup steps to completion on their own task.
    pub async fn setup(&self) -> Result<SharedContext, FlowError> {
        let sequence = setup_sequence(&self.provider, &self.config);
        info!(steps = sequence.len(), "Running setup");
        async { sequence.spawn(SharedContext::new()).wait().await }
            .instrument(info_span!("setup"))
            .await?
    }

    /// Sets up the route, publishes every message, then stops and drains the queue.
    ///
    /// A setup failure returns before the poll loop starts. A publish failure
    /// still stops and drains the loop before it is returned. If the poll loop
    /// ends on its own, no further messages are published and its error is
    /// returned.
    pub async fn run(self) -> Result<RunReport, FlowError> {
        let context = self.setup().await?;
        let queue = context
            .queue_url()
            .map_err(FlowError::IncompleteSetup)?
            .clone();
        let topic = context
            .topic_arn()
            .map_err(FlowError::IncompleteSetup)?
            .clone();

        let mut poll_loop =
            PollDrainLoop::new(self.provider.clone(), queue, self.config.drain.clone());
        if let Some(handler) = self.handler.clone() {
            poll_loop = poll_loop.with_handler(move |message| handler(message));
        }
        let drain = poll_loop.start();

        let mut gate = PublishGate::new(self.provider.clone(), topic)
            .with_timeout(self.config.publish_timeout());
        let published = async {
            for sequence in 1..=self.config.message_count {
                if drain.is_finished() {
                    warn!(sequence, "Poll loop ended early; publishing stopped");
                    break;
                }
                gate.publish(&self.config.message_body(sequence)).await?;
            }
            Ok::<_, FlowError>(())
        }
        .instrument(info_span!("publishing", count = self.config.message_count))
        .await;
        info!(published = gate.published(), "Publishing finished");

        drain.request_stop();
        let drained = drain.wait().await;

        if let Err(e) = published {
            warn!(error = %e, "Publishing aborted; queue drained before returning");
            return Err(e);
        }
        let drain = drained?;
        Ok(RunReport {
            context,
            published: gate.published(),
            drain,
        })
    }
}

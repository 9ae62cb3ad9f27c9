use pubsub_flow::{QueueArn, QueueUrl, StepError, SubscriptionArn, TopicArn};

/// Identifiers produced while setting up the topic and queue.
///
/// Each field is written once by the step that creates it and read by the
/// steps after it. Writing a field twice, or reading one that has not been
/// written yet, is a [`StepError`] rather than a silent overwrite or a panic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedContext {
    topic_arn: Option<TopicArn>,
    queue_url: Option<QueueUrl>,
    queue_arn: Option<QueueArn>,
    subscription_arn: Option<SubscriptionArn>,
    policy_installed: bool,
}

fn write_once<T>(slot: &mut Option<T>, field: &'static str, value: T) -> Result<(), StepError> {
    if slot.is_some() {
        return Err(StepError::AlreadyWritten(field));
    }
    *slot = Some(value);
    Ok(())
}

fn read<'a, T>(slot: &'a Option<T>, field: &'static str) -> Result<&'a T, StepError> {
    slot.as_ref().ok_or(StepError::MissingInput(field))
}

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topic_arn(&self) -> Result<&TopicArn, StepError> {
        read(&self.topic_arn, "topic_arn")
    }

    pub fn set_topic_arn(&mut self, arn: TopicArn) -> Result<(), StepError> {
        write_once(&mut self.topic_arn, "topic_arn", arn)
    }

    pub fn queue_url(&self) -> Result<&QueueUrl, StepError> {
        read(&self.queue_url, "queue_url")
    }

    pub fn set_queue_url(&mut self, url: QueueUrl) -> Result<(), StepError> {
        write_once(&mut self.queue_url, "queue_url", url)
    }

    pub fn queue_arn(&self) -> Result<&QueueArn, StepError> {
        read(&self.queue_arn, "queue_arn")
    }

    pub fn set_queue_arn(&mut self, arn: QueueArn) -> Result<(), StepError> {
        write_once(&mut self.queue_arn, "queue_arn", arn)
    }

    pub fn subscription_arn(&self) -> Result<&SubscriptionArn, StepError> {
        read(&self.subscription_arn, "subscription_arn")
    }

    pub fn set_subscription_arn(&mut self, arn: SubscriptionArn) -> Result<(), StepError> {
        write_once(&mut self.subscription_arn, "subscription_arn", arn)
    }

    pub fn policy_installed(&self) -> bool {
        self.policy_installed
    }

    pub fn mark_policy_installed(&mut self) -> Result<(), StepError> {
        if self.policy_installed {
            return Err(StepError::AlreadyWritten("policy_installed"));
        }
        self.policy_installed = true;
        Ok(())
    }

    /// True once every setup step has recorded its result.
    pub fn is_complete(&self) -> bool {
        self.topic_arn.is_some()
            && self.queue_url.is_some()
            && self.queue_arn.is_some()
            && self.subscription_arn.is_some()
            && self.policy_installed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_before_write_is_missing_input() {
        let ctx = SharedContext::new();
        assert_eq!(ctx.queue_arn(), Err(StepError::MissingInput("queue_arn")));
    }

    #[test]
    fn test_fields_are_write_once() {
        let mut ctx = SharedContext::new();
        ctx.set_topic_arn(TopicArn::new("arn:a")).unwrap();
        assert_eq!(
            ctx.set_topic_arn(TopicArn::new("arn:b")),
            Err(StepError::AlreadyWritten("topic_arn"))
        );
        assert_eq!(ctx.topic_arn().unwrap().as_str(), "arn:a");
    }

    #[test]
    fn test_complete_after_every_field() {
        let mut ctx = SharedContext::new();
        ctx.set_topic_arn(TopicArn::new("t")).unwrap();
        ctx.set_queue_url(QueueUrl::new("q")).unwrap();
        ctx.set_queue_arn(QueueArn::new("qa")).unwrap();
        ctx.set_subscription_arn(SubscriptionArn::new("s")).unwrap();
        assert!(!ctx.is_complete());
        ctx.mark_policy_installed().unwrap();
        assert!(ctx.is_complete());
    }
}

use pubsub_flow::mock::{message, Call, MockProvider};
use pubsub_flow::{
    DrainConfig, FlowError, MessageId, PollDrainLoop, ProviderError, PublishGate, QueueUrl,
    ReceiptHandle, RetryPolicy, TopicArn,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn queue() -> QueueUrl {
    QueueUrl::new("mock://queues/demo")
}

fn start(mock: &Arc<MockProvider>, config: DrainConfig) -> pubsub_flow::DrainHandle {
    PollDrainLoop::new(mock.clone(), queue(), config).start()
}

// --- Poll / drain loop ---

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_while_batch_in_flight_drains_and_resolves_once() {
    let mock = Arc::new(MockProvider::new());
    let in_flight = mock.expect_receive().hold();

    let handle = start(&mock, DrainConfig::default());

    let completer = in_flight.arrived().await;
    assert!(handle.request_stop());
    completer.succeed(vec![
        message("1", "message: 1"),
        message("2", "message: 2"),
        message("3", "message: 3"),
    ]);

    let report = handle.wait().await.unwrap();
    assert_eq!(report.received, 3);
    assert_eq!(report.acknowledged, 3);
    assert_eq!(report.batches, 2);

    // Acknowledgments run concurrently, so only the set of receipts is fixed.
    let mut deleted = mock.deleted_receipts();
    deleted.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    assert_eq!(
        deleted,
        vec![
            ReceiptHandle::new("receipt-1"),
            ReceiptHandle::new("receipt-2"),
            ReceiptHandle::new("receipt-3"),
        ]
    );

    // Stopped means stopped: no receive after the terminal empty batch.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(mock.count("receive_batch"), 2);
    mock.verify();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_empty_batch_issued_before_stop_does_not_end_loop() {
    let mock = Arc::new(MockProvider::new());
    let issued_before_stop = mock.expect_receive().hold();
    mock.expect_receive().return_ok(vec![message("late", "published after that receive")]);

    let handle = start(&mock, DrainConfig::default());

    let completer = issued_before_stop.arrived().await;
    handle.request_stop();
    completer.succeed(Vec::new());

    let report = handle.wait().await.unwrap();
    assert_eq!(report.received, 1);
    assert_eq!(report.acknowledged, 1);
    assert_eq!(mock.count("receive_batch"), 3);
    mock.verify();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_loop_keeps_polling_while_not_stopped() {
    let mock = Arc::new(MockProvider::new());
    mock.expect_receive().return_ok(vec![message("1", "a")]);
    mock.expect_receive().return_ok(Vec::new());
    mock.expect_receive().return_ok(vec![message("2", "b")]);

    let handle = start(&mock, DrainConfig::default());

    // Empty batches do not end the loop while no stop was requested.
    mock.wait_for_calls("receive_batch", 50).await;
    assert!(!handle.is_finished());

    handle.request_stop();
    let report = handle.wait().await.unwrap();
    assert_eq!(report.received, 2);
    assert_eq!(report.acknowledged, 2);
    assert!(report.batches >= 50);
}

#[tokio::test]
async fn test_stop_with_non_empty_batch_receives_again() {
    let mock = Arc::new(MockProvider::new());
    mock.expect_receive().return_ok(vec![message("1", "a")]);
    mock.expect_receive().return_ok(vec![message("2", "b"), message("3", "c")]);

    let drain = PollDrainLoop::new(mock.clone(), queue(), DrainConfig::default());
    drain.stop_flag().request_stop();
    let handle = drain.start();

    let report = handle.wait().await.unwrap();
    assert_eq!(mock.count("receive_batch"), 3);
    assert_eq!(report.received, 3);
    assert_eq!(report.acknowledged, 3);
}

#[tokio::test]
async fn test_receive_batches_are_capped_by_config() {
    let mock = Arc::new(MockProvider::new());
    let config = DrainConfig {
        max_batch_size: 4,
        ..DrainConfig::default()
    };

    let handle = start(&mock, config);
    handle.request_stop();
    handle.wait().await.unwrap();

    assert!(mock.calls().iter().all(|call| match call {
        Call::ReceiveBatch { max_items, .. } => *max_items == 4,
        _ => true,
    }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_completion_waits_for_outstanding_acknowledgments() {
    let mock = Arc::new(MockProvider::new());
    mock.expect_receive().return_ok(vec![message("1", "a")]);
    let delete = mock.expect_delete().hold();

    let handle = start(&mock, DrainConfig::default());
    handle.request_stop();
    let waiting = tokio::spawn(handle.wait());

    let completer = delete.arrived().await;
    mock.wait_for_calls("receive_batch", 2).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiting.is_finished(), "drain resolved before its acknowledgment");

    completer.succeed(());
    let report = waiting.await.unwrap().unwrap();
    assert_eq!(report.acknowledged, 1);
    assert_eq!(report.ack_failures, 0);
}

#[tokio::test]
async fn test_failed_acknowledgment_is_counted_not_fatal() {
    let mock = Arc::new(MockProvider::new());
    mock.expect_receive()
        .return_ok(vec![message("1", "a"), message("2", "b")]);
    mock.expect_delete()
        .return_err(ProviderError::NotFound("receipt-1".into()));

    let handle = start(&mock, DrainConfig::default());
    handle.request_stop();
    let report = handle.wait().await.unwrap();

    assert_eq!(report.received, 2);
    assert_eq!(report.acknowledged, 1);
    assert_eq!(report.ack_failures, 1);
    mock.verify();
}

#[tokio::test]
async fn test_transient_acknowledgment_failure_is_retried() {
    let mock = Arc::new(MockProvider::new());
    mock.expect_receive().return_ok(vec![message("1", "a")]);
    mock.expect_delete()
        .return_err(ProviderError::Unavailable("throttled".into()));
    let config = DrainConfig {
        ack_retry: RetryPolicy::exponential(3, Duration::from_millis(1), Duration::from_millis(2)),
        ..DrainConfig::default()
    };

    let handle = start(&mock, config);
    handle.request_stop();
    let report = handle.wait().await.unwrap();

    assert_eq!(report.acknowledged, 1);
    assert_eq!(mock.count("delete_message"), 2);
}

#[tokio::test]
async fn test_receive_failure_surfaces_after_retries() {
    let mock = Arc::new(MockProvider::new());
    for _ in 0..3 {
        mock.expect_receive()
            .return_err(ProviderError::Unavailable("throttled".into()));
    }
    let config = DrainConfig {
        receive_retry: RetryPolicy::exponential(3, Duration::from_millis(1), Duration::from_millis(2)),
        ..DrainConfig::default()
    };

    let err = start(&mock, config).wait().await.unwrap_err();

    match err {
        FlowError::ReceiveFailed(exhausted) => {
            assert_eq!(exhausted.attempts, 3);
            assert_eq!(exhausted.source, ProviderError::Unavailable("throttled".into()));
        }
        other => panic!("Expected ReceiveFailed, got {other:?}"),
    }
    assert_eq!(mock.count("receive_batch"), 3);
}

#[tokio::test]
async fn test_receive_failure_without_retry_fails_fast() {
    let mock = Arc::new(MockProvider::new());
    mock.expect_receive()
        .return_err(ProviderError::AccessDenied("queue".into()));

    let err = start(&mock, DrainConfig::default()).wait().await.unwrap_err();

    assert!(matches!(err, FlowError::ReceiveFailed(_)));
    assert_eq!(mock.count("receive_batch"), 1);
}

#[tokio::test]
async fn test_handler_sees_every_message_before_acknowledgment() {
    let mock = Arc::new(MockProvider::new());
    mock.expect_receive()
        .return_ok(vec![message("1", "first"), message("2", "second")]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();

    let handle = PollDrainLoop::new(mock.clone(), queue(), DrainConfig::default())
        .with_handler(move |m| recorder.lock().unwrap().push(m.body.clone()))
        .start();
    handle.request_stop();
    handle.wait().await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
}

// --- Publish gate ---

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_publishes_are_issued_one_at_a_time() {
    let mock = Arc::new(MockProvider::new());
    let first = mock.expect_publish().hold();
    let mut gate = PublishGate::new(mock.clone(), TopicArn::new("arn:mock:sns:demo"));

    let publisher = tokio::spawn(async move {
        for i in 1..=3 {
            gate.publish(&format!("message: {i}")).await?;
        }
        Ok::<_, FlowError>(gate.published())
    });

    let completer = first.arrived().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(mock.count("publish"), 1, "second publish issued before the first resolved");

    completer.succeed(MessageId::new("first"));
    assert_eq!(publisher.await.unwrap().unwrap(), 3);
    assert_eq!(
        mock.published_bodies(),
        vec!["message: 1", "message: 2", "message: 3"]
    );
}

#[tokio::test]
async fn test_publish_that_never_completes_times_out() {
    let mock = Arc::new(MockProvider::new());
    mock.expect_publish().never();
    let mut gate = PublishGate::new(mock.clone(), TopicArn::new("arn:mock:sns:demo"))
        .with_timeout(Some(Duration::from_millis(30)));

    let err = gate.publish("message: 1").await.unwrap_err();

    assert!(matches!(err, FlowError::PublishTimeout(_)));
    assert_eq!(gate.published(), 0);
}

#[tokio::test]
async fn test_abandoned_publish_is_a_failure() {
    let mock = Arc::new(MockProvider::new());
    let held = mock.expect_publish().hold();
    drop(held);
    let mut gate = PublishGate::new(mock.clone(), TopicArn::new("arn:mock:sns:demo"));

    let err = gate.publish("message: 1").await.unwrap_err();

    assert!(matches!(
        err,
        FlowError::PublishFailed(ProviderError::Abandoned)
    ));
}

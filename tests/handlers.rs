mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{TestConsumer, TestProducer, eventually, recording_chain};
use flowvisor::{
    Adapter, BackoffPolicy, Channel, Component, ComponentState, FAILURE_REASON_KEY, HandlerRef,
    Message, ProcessingChain, ProcessingExceptionHandler, ProduceFailurePolicy, RetryConfig,
    RetryMessageErrorHandler, StandardProcessingHandler, WORKFLOW_ID_KEY, Workflow,
    WorkflowConfig,
};

fn standard(name: &str) -> HandlerRef {
    Arc::new(StandardProcessingHandler::new(name, ProcessingChain::new()))
}

fn primary_name(wf: &Workflow) -> String {
    wf.resolved_handler().primary().name().to_string()
}

#[tokio::test]
async fn closest_handler_wins_and_clearing_falls_back() {
    let wf = Workflow::builder(TestConsumer::new("in"))
        .producer(TestProducer::new("out"))
        .processing_handler(standard("workflow-handler"))
        .build()
        .unwrap();
    let channel = Channel::builder("orders")
        .workflow(wf.clone())
        .processing_handler(standard("channel-handler"))
        .build()
        .unwrap();
    let _adapter = Adapter::builder("root")
        .processing_handler(standard("root-handler"))
        .channel(channel.clone())
        .build()
        .unwrap();

    assert_eq!(primary_name(&wf), "workflow-handler");

    wf.set_processing_handler(None);
    assert_eq!(primary_name(&wf), "channel-handler");

    channel.set_processing_handler(None);
    assert_eq!(primary_name(&wf), "root-handler");
}

#[tokio::test]
async fn unconfigured_scopes_resolve_to_null_handler() {
    let wf = Workflow::builder(TestConsumer::new("in"))
        .producer(TestProducer::new("out"))
        .build()
        .unwrap();
    let resolved = wf.resolved_handler();
    assert_eq!(resolved.primary().kind(), "null");
    assert!(resolved.escalations().is_empty());
}

#[tokio::test]
async fn always_handling_outer_handler_sees_failures_too() {
    let (inner_chain, inner_seen) = recording_chain();
    let (outer_chain, outer_seen) = recording_chain();
    let inner: HandlerRef = Arc::new(StandardProcessingHandler::new("inner", inner_chain));
    let outer: HandlerRef =
        Arc::new(StandardProcessingHandler::new("outer", outer_chain).with_always_handle(true));

    let consumer = TestConsumer::new("in");
    let wf = Workflow::builder(consumer.clone())
        .producer(TestProducer::failing("out"))
        .processing_handler(inner)
        .build()
        .unwrap();
    let channel = Channel::builder("orders")
        .workflow(wf.clone())
        .processing_handler(outer.clone())
        .build()
        .unwrap();

    channel.request_start().await.unwrap();
    outer.request_start().await.unwrap();
    consumer.push(Message::new("payload")).await;

    assert_eq!(inner_seen.lock().len(), 1);
    assert_eq!(outer_seen.lock().len(), 1);
    let routed = inner_seen.lock()[0].clone();
    assert_eq!(routed.metadata(WORKFLOW_ID_KEY), Some(wf.workflow_id().as_str()));
}

fn retry_config(limit: u32, interval: Duration) -> RetryConfig {
    RetryConfig {
        retry_limit: limit,
        backoff: BackoffPolicy::constant(interval),
        lock_timeout: Duration::from_secs(1),
    }
}

#[tokio::test]
async fn retry_limit_bounds_attempts_and_recovers_once() {
    let (recovery, recovered) = recording_chain();
    let handler = RetryMessageErrorHandler::new(
        "retry",
        retry_config(2, Duration::from_millis(10)),
        recovery,
    );
    let consumer = TestConsumer::new("in");
    let producer = TestProducer::failing("out");
    let wf = Workflow::builder(consumer.clone())
        .id("orders")
        .producer(producer.clone())
        .processing_handler(handler.clone())
        .build()
        .unwrap();
    wf.request_start().await.unwrap();

    consumer.push(Message::new("payload")).await;
    assert!(eventually(Duration::from_secs(2), || recovered.lock().len() == 1).await);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recovered.lock().len(), 1);
    // The original attempt plus two retries.
    assert_eq!(producer.attempts.load(Ordering::SeqCst), 3);
    assert!(handler.waiting_for_retry().is_empty());
}

#[tokio::test]
async fn operator_retry_succeeds_without_recovery() {
    let (recovery, recovered) = recording_chain();
    let handler =
        RetryMessageErrorHandler::new("retry", retry_config(0, Duration::from_secs(60)), recovery);
    let consumer = TestConsumer::new("in");
    let producer = TestProducer::failing("out");
    let wf = Workflow::builder(consumer.clone())
        .id("orders")
        .producer(producer.clone())
        .processing_handler(handler.clone())
        .build()
        .unwrap();
    wf.request_start().await.unwrap();

    consumer.push(Message::new("payload")).await;
    let waiting = handler.waiting_for_retry();
    assert_eq!(waiting.len(), 1);

    producer.fail.store(false, Ordering::SeqCst);
    assert!(handler.retry_message(waiting[0]).await);
    assert!(handler.waiting_for_retry().is_empty());
    assert_eq!(producer.produced_count(), 1);
    assert!(recovered.lock().is_empty());
    assert!(!handler.retry_message(waiting[0]).await);
}

#[tokio::test]
async fn operator_fail_hands_message_to_recovery() {
    let (recovery, recovered) = recording_chain();
    let handler =
        RetryMessageErrorHandler::new("retry", retry_config(0, Duration::from_secs(60)), recovery);
    let consumer = TestConsumer::new("in");
    let wf = Workflow::builder(consumer.clone())
        .id("orders")
        .producer(TestProducer::failing("out"))
        .processing_handler(handler.clone())
        .build()
        .unwrap();
    wf.request_start().await.unwrap();

    consumer.push(Message::new("first")).await;
    consumer.push(Message::new("second")).await;
    let waiting = handler.waiting_for_retry();
    assert_eq!(waiting.len(), 2);

    assert!(handler.fail_message(waiting[0]).await);
    assert!(!handler.fail_message(waiting[0]).await);
    assert_eq!(recovered.lock().len(), 1);

    assert_eq!(handler.fail_all().await, 1);
    assert_eq!(recovered.lock().len(), 2);
}

#[tokio::test]
async fn stopping_the_workflow_drains_pending_retries() {
    let (recovery, recovered) = recording_chain();
    let handler =
        RetryMessageErrorHandler::new("retry", retry_config(0, Duration::from_secs(60)), recovery);
    let consumer = TestConsumer::new("in");
    let wf = Workflow::builder(consumer.clone())
        .id("orders")
        .producer(TestProducer::failing("out"))
        .processing_handler(handler.clone())
        .build()
        .unwrap();
    wf.request_start().await.unwrap();
    consumer.push(Message::new("payload")).await;
    assert_eq!(handler.waiting_for_retry().len(), 1);

    wf.request_stop().await.unwrap();
    assert!(handler.waiting_for_retry().is_empty());
    assert_eq!(recovered.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_a_retry_attempt_in_flight() {
    let (recovery, recovered) = recording_chain();
    let handler =
        RetryMessageErrorHandler::new("retry", retry_config(0, Duration::from_millis(10)), recovery);
    let consumer = TestConsumer::new("in");
    let producer = TestProducer::slow_failing("out", Duration::from_millis(500));
    let wf = Workflow::builder(consumer.clone())
        .id("orders")
        .producer(producer.clone())
        .processing_handler(handler.clone())
        .build()
        .unwrap();
    wf.request_start().await.unwrap();

    consumer.push(Message::new("payload")).await;
    let id = handler.waiting_for_retry()[0];
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(handler.is_retrying(id));
    assert_eq!(producer.attempts.load(Ordering::SeqCst), 2);

    let began = tokio::time::Instant::now();
    wf.request_stop().await.unwrap();
    assert!(began.elapsed() < Duration::from_millis(400));
    assert!(handler.waiting_for_retry().is_empty());
    assert_eq!(recovered.lock().len(), 1);
    assert_eq!(producer.attempts.load(Ordering::SeqCst), 2);
}

fn restarting(
    consumer: &Arc<TestConsumer>,
    producer: &Arc<TestProducer>,
    policy: ProduceFailurePolicy,
) -> Arc<Workflow> {
    Workflow::builder(consumer.clone())
        .producer(producer.clone())
        .config(WorkflowConfig {
            produce_policy: policy,
            ..Default::default()
        })
        .build()
        .unwrap()
}

#[tokio::test]
async fn produce_failure_restarts_the_workflow() {
    let consumer = TestConsumer::new("in");
    let producer = TestProducer::failing("out");
    let wf = restarting(&consumer, &producer, ProduceFailurePolicy::RestartWorkflow);
    wf.request_start().await.unwrap();

    consumer.push(Message::new("payload")).await;
    let restarted = || consumer.counts.snapshot() == [2, 2, 1, 1];
    assert!(eventually(Duration::from_secs(2), restarted).await);
    assert!(eventually(Duration::from_secs(1), || wf.state() == ComponentState::Started).await);
    assert_eq!(producer.counts.snapshot(), [2, 2, 1, 1]);
}

#[tokio::test]
async fn produce_failure_restarts_the_owning_channel() {
    let failing_consumer = TestConsumer::new("in-a");
    let sibling_consumer = TestConsumer::new("in-b");
    let producer = TestProducer::failing("out");
    let channel = Channel::builder("orders")
        .workflow(restarting(
            &failing_consumer,
            &producer,
            ProduceFailurePolicy::RestartChannel,
        ))
        .workflow(restarting(
            &sibling_consumer,
            &TestProducer::new("out"),
            ProduceFailurePolicy::None,
        ))
        .build()
        .unwrap();
    channel.request_start().await.unwrap();

    failing_consumer.push(Message::new("payload")).await;
    // The sibling goes down and up with the channel.
    let restarted = || sibling_consumer.counts.snapshot() == [2, 2, 1, 1];
    assert!(eventually(Duration::from_secs(2), restarted).await);
    assert!(eventually(Duration::from_secs(1), || channel.state() == ComponentState::Started).await);
    assert_eq!(failing_consumer.counts.snapshot(), [2, 2, 1, 1]);
    assert!(channel.is_available());
}

#[tokio::test]
async fn no_restart_without_a_policy() {
    let consumer = TestConsumer::new("in");
    let wf = restarting(&consumer, &TestProducer::failing("out"), ProduceFailurePolicy::None);
    wf.request_start().await.unwrap();

    consumer.push(Message::new("payload")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(consumer.counts.snapshot(), [1, 1, 0, 0]);
}

fn request_reply(
    consumer: &Arc<TestConsumer>,
    requester: &Arc<TestProducer>,
    replies: &Arc<TestProducer>,
    cfg: WorkflowConfig,
    handler: HandlerRef,
) -> Arc<Workflow> {
    Workflow::builder(consumer.clone())
        .request_reply(requester.clone(), ProcessingChain::new(), Some(replies.clone()))
        .config(cfg)
        .processing_handler(handler)
        .build()
        .unwrap()
}

fn pong() -> Message {
    let mut reply = Message::new("pong");
    reply.set_metadata("status", "200");
    reply
}

fn ping() -> Message {
    let mut msg = Message::new("ping");
    msg.set_metadata("trace", "t-1");
    msg
}

#[tokio::test]
async fn reply_is_merged_and_forwarded() {
    let consumer = TestConsumer::new("in");
    let requester = TestProducer::replying("rpc", Some(pong()));
    let replies = TestProducer::new("replies");
    let cfg = WorkflowConfig::default();
    let wf = request_reply(&consumer, &requester, &replies, cfg, standard("dlq"));
    wf.request_start().await.unwrap();

    consumer.push(ping()).await;

    assert_eq!(requester.produced.lock()[0].payload(), b"ping");
    let out = replies.produced.lock()[0].clone();
    assert_eq!(out.payload(), b"pong");
    assert_eq!(out.metadata("trace"), Some("t-1"));
    assert_eq!(out.metadata("status"), Some("200"));
}

#[tokio::test]
async fn reply_metadata_can_be_ignored() {
    let consumer = TestConsumer::new("in");
    let requester = TestProducer::replying("rpc", Some(pong()));
    let replies = TestProducer::new("replies");
    let cfg = WorkflowConfig {
        ignore_reply_metadata: true,
        ..Default::default()
    };
    let wf = request_reply(&consumer, &requester, &replies, cfg, standard("dlq"));
    wf.request_start().await.unwrap();

    consumer.push(ping()).await;

    let out = replies.produced.lock()[0].clone();
    assert_eq!(out.payload(), b"pong");
    assert_eq!(out.metadata("trace"), Some("t-1"));
    assert_eq!(out.metadata("status"), None);
}

#[tokio::test(start_paused = true)]
async fn missing_reply_times_out_and_routes_the_request() {
    let (recovery, recovered) = recording_chain();
    let consumer = TestConsumer::new("in");
    let requester = TestProducer::replying("rpc", None);
    let replies = TestProducer::new("replies");
    let cfg = WorkflowConfig {
        reply_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let handler: HandlerRef = Arc::new(StandardProcessingHandler::new("dlq", recovery));
    let wf = request_reply(&consumer, &requester, &replies, cfg, handler);
    wf.request_start().await.unwrap();

    let began = tokio::time::Instant::now();
    consumer.push(ping()).await;
    assert!(began.elapsed() >= Duration::from_millis(100));

    assert_eq!(replies.produced_count(), 0);
    let routed = recovered.lock()[0].clone();
    assert_eq!(routed.payload(), b"ping");
    let reason = routed.metadata(FAILURE_REASON_KEY).unwrap_or_default();
    assert!(reason.contains("no reply from 'rpc'"));
}

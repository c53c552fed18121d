mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{TestConsumer, TestProducer};
use flowvisor::{
    Adapter, AdapterConfig, Channel, Component, ComponentState, LifecycleStrategy, Workflow,
};
use futures::future::join_all;

fn workflow(consumer: &Arc<TestConsumer>, producer: &Arc<TestProducer>) -> Arc<Workflow> {
    Workflow::builder(consumer.clone())
        .producer(producer.clone())
        .build()
        .unwrap()
}

#[tokio::test]
async fn repeated_requests_run_hooks_once() {
    let consumer = TestConsumer::new("in");
    let producer = TestProducer::new("out");
    let channel = Channel::builder("orders")
        .workflow(workflow(&consumer, &producer))
        .build()
        .unwrap();

    assert_eq!(channel.request_start().await.unwrap(), ComponentState::Started);
    assert_eq!(channel.request_start().await.unwrap(), ComponentState::Started);
    assert_eq!(consumer.counts.snapshot(), [1, 1, 0, 0]);
    assert_eq!(producer.counts.snapshot(), [1, 1, 0, 0]);

    channel.request_close().await.unwrap();
    channel.request_close().await.unwrap();
    assert_eq!(consumer.counts.snapshot(), [1, 1, 1, 1]);
    assert_eq!(channel.state(), ComponentState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_initialise_once() {
    let consumer = TestConsumer::new("in");
    let producer = TestProducer::new("out");
    let wf = workflow(&consumer, &producer);

    let results = join_all((0..16).map(|_| {
        let wf = Arc::clone(&wf);
        async move { wf.request_start().await }
    }))
    .await;

    assert!(results.iter().all(|r| matches!(r, Ok(ComponentState::Started))));
    assert_eq!(consumer.counts.init.load(Ordering::SeqCst), 1);
    assert_eq!(consumer.counts.start.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn channel_init_revives_a_closed_workflow() {
    let consumer = TestConsumer::new("in");
    let producer = TestProducer::new("out");
    let wf = workflow(&consumer, &producer);
    let channel = Channel::builder("orders").workflow(wf.clone()).build().unwrap();

    channel.request_init().await.unwrap();
    wf.request_close().await.unwrap();
    assert_eq!(wf.state(), ComponentState::Closed);
    assert_eq!(channel.state(), ComponentState::Initialised);

    channel.request_init().await.unwrap();
    assert_eq!(wf.state(), ComponentState::Initialised);
    assert_eq!(consumer.counts.init.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn adapter_init_revives_a_closed_channel() {
    let consumer = TestConsumer::new("in");
    let producer = TestProducer::new("out");
    let channel = Channel::builder("orders")
        .workflow(workflow(&consumer, &producer))
        .build()
        .unwrap();
    let adapter = Adapter::builder("root").channel(channel.clone()).build().unwrap();

    adapter.request_init().await.unwrap();
    channel.request_close().await.unwrap();
    assert_eq!(channel.state(), ComponentState::Closed);

    adapter.request_init().await.unwrap();
    assert_eq!(channel.state(), ComponentState::Initialised);
    assert_eq!(adapter.state(), ComponentState::Initialised);
}

#[tokio::test]
async fn starting_a_stopped_workflow_runs_init_again() {
    let consumer = TestConsumer::new("in");
    let producer = TestProducer::new("out");
    let wf = workflow(&consumer, &producer);

    wf.request_start().await.unwrap();
    wf.request_stop().await.unwrap();
    assert_eq!(wf.state(), ComponentState::Stopped);

    wf.request_start().await.unwrap();
    assert_eq!(consumer.counts.snapshot(), [2, 2, 1, 1]);
}

#[tokio::test]
async fn non_blocking_channel_starts_despite_a_failing_workflow() {
    let good = TestConsumer::new("in-good");
    let bad = TestConsumer::failing_init("in-bad");
    let producer = TestProducer::new("out");
    let good_wf = workflow(&good, &producer);
    let bad_wf = workflow(&bad, &producer);
    let channel = Channel::builder("orders")
        .strategy(LifecycleStrategy::NonBlocking)
        .workflow(good_wf.clone())
        .workflow(bad_wf.clone())
        .build()
        .unwrap();

    assert_eq!(channel.request_start().await.unwrap(), ComponentState::Started);
    assert_eq!(good_wf.state(), ComponentState::Started);
    assert_eq!(bad_wf.state(), ComponentState::Closed);
    assert!(channel.is_available());

    channel.request_close().await.unwrap();
    assert_eq!(good.counts.snapshot(), [1, 1, 1, 1]);
}

#[tokio::test]
async fn blocking_channel_fails_on_the_first_failing_workflow() {
    let bad = TestConsumer::failing_init("in-bad");
    let channel = Channel::builder("orders")
        .workflow(workflow(&bad, &TestProducer::new("out")))
        .build()
        .unwrap();

    assert!(channel.request_start().await.is_err());
    assert_eq!(channel.state(), ComponentState::Closed);
}

#[tokio::test]
async fn non_blocking_adapter_starts_healthy_channels() {
    let good = TestConsumer::new("in-good");
    let good_channel = Channel::builder("good")
        .workflow(workflow(&good, &TestProducer::new("out")))
        .build()
        .unwrap();
    let bad_channel = Channel::builder("bad")
        .workflow(workflow(&TestConsumer::failing_init("in-bad"), &TestProducer::new("out")))
        .build()
        .unwrap();
    let adapter = Adapter::builder("root")
        .config(AdapterConfig {
            strategy: LifecycleStrategy::NonBlocking,
            ..AdapterConfig::default()
        })
        .channel(good_channel.clone())
        .channel(bad_channel.clone())
        .build()
        .unwrap();

    assert_eq!(adapter.request_start().await.unwrap(), ComponentState::Started);
    assert_eq!(good_channel.state(), ComponentState::Started);
    assert_eq!(bad_channel.state(), ComponentState::Closed);
    assert_eq!(good.counts.snapshot(), [1, 1, 0, 0]);

    adapter.shutdown().await.unwrap();
    assert_eq!(good_channel.state(), ComponentState::Closed);
}

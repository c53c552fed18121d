mod common;

use std::sync::Arc;

use common::{TestConsumer, TestProducer, TestTransport};
use flowvisor::{
    Adapter, Channel, CloseDependents, Component, ComponentState, ConfigError, Connection,
    ConnectionRef, LifecycleError, RestartDependents, Workflow,
};

fn workflow(consumer: &Arc<TestConsumer>) -> Arc<Workflow> {
    Workflow::builder(consumer.clone())
        .producer(TestProducer::new("out"))
        .build()
        .unwrap()
}

#[tokio::test]
async fn failure_restarts_only_started_dependents() {
    let transport = TestTransport::new(Some("tcp://broker:5672"));
    let broker = Connection::new("broker", transport.clone())
        .unwrap()
        .with_error_handler(Arc::new(RestartDependents));

    let builder = Adapter::builder("root").shared_connection(broker);
    let directory = builder.directory();
    let consumer_a = TestConsumer::new("in-a");
    let consumer_b = TestConsumer::new("in-b");
    let channel_a = Channel::builder("a")
        .connection(ConnectionRef::shared("broker", &directory))
        .workflow(workflow(&consumer_a))
        .build()
        .unwrap();
    let channel_b = Channel::builder("b")
        .connection(ConnectionRef::shared("broker", &directory))
        .workflow(workflow(&consumer_b))
        .build()
        .unwrap();
    let adapter = builder
        .channel(channel_a.clone())
        .channel(channel_b.clone())
        .build()
        .unwrap();

    adapter.request_init().await.unwrap();
    channel_a.request_start().await.unwrap();
    let broker = adapter.directory().resolve("broker").unwrap();
    assert_eq!(broker.state(), ComponentState::Started);
    assert_eq!(broker.dependents().len(), 2);
    assert_eq!(transport.counts.snapshot(), [1, 1, 0, 0]);

    broker.handle_connection_failure().await.unwrap();

    assert_eq!(transport.counts.snapshot(), [2, 2, 1, 1]);
    assert_eq!(channel_a.state(), ComponentState::Started);
    assert_eq!(consumer_a.counts.snapshot(), [2, 2, 1, 1]);
    assert_eq!(channel_b.state(), ComponentState::Initialised);
    assert_eq!(consumer_b.counts.snapshot(), [1, 0, 0, 0]);
    assert_eq!(broker.dependents().len(), 2);
}

#[tokio::test]
async fn close_handler_closes_every_dependent() {
    let transport = TestTransport::new(None);
    let conn = Connection::new("db", transport)
        .unwrap()
        .with_error_handler(Arc::new(CloseDependents));
    let consumer = TestConsumer::new("in");
    let channel = Channel::builder("orders")
        .connection(conn.clone())
        .workflow(workflow(&consumer))
        .build()
        .unwrap();

    channel.request_start().await.unwrap();
    conn.handle_connection_failure().await.unwrap();

    assert_eq!(channel.state(), ComponentState::Closed);
    assert_eq!(consumer.counts.snapshot(), [1, 1, 1, 1]);
    // A direct connection follows its channel down.
    assert_eq!(conn.state(), ComponentState::Closed);
}

#[tokio::test]
async fn equivalent_connections_with_incompatible_handlers_fail_init() {
    let first = Connection::new("primary", TestTransport::new(Some("tcp://db:5432")))
        .unwrap()
        .with_error_handler(Arc::new(RestartDependents));
    let second = Connection::new("replica", TestTransport::new(Some("tcp://db:5432")))
        .unwrap()
        .with_error_handler(Arc::new(CloseDependents));
    let channel = Channel::builder("orders")
        .connection(first)
        .connection(second)
        .workflow(workflow(&TestConsumer::new("in")))
        .build()
        .unwrap();

    assert!(matches!(
        channel.prepare(),
        Err(ConfigError::IncompatibleHandlers { .. })
    ));
    let err = channel.request_init().await.unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Config {
            source: ConfigError::IncompatibleHandlers { .. },
            ..
        }
    ));
    assert_eq!(channel.state(), ComponentState::Closed);
}

#[tokio::test]
async fn distinct_endpoints_may_carry_any_handlers() {
    let first = Connection::new("primary", TestTransport::new(Some("tcp://db-1:5432")))
        .unwrap()
        .with_error_handler(Arc::new(RestartDependents));
    let second = Connection::new("replica", TestTransport::new(Some("tcp://db-2:5432")))
        .unwrap()
        .with_error_handler(Arc::new(CloseDependents));
    let channel = Channel::builder("orders")
        .connection(first)
        .connection(second)
        .workflow(workflow(&TestConsumer::new("in")))
        .build()
        .unwrap();

    assert_eq!(channel.request_init().await.unwrap(), ComponentState::Initialised);
}

#[tokio::test]
async fn unknown_shared_connection_fails_init() {
    let builder = Adapter::builder("root");
    let channel = Channel::builder("orders")
        .connection(ConnectionRef::shared("missing", &builder.directory()))
        .workflow(workflow(&TestConsumer::new("in")))
        .build()
        .unwrap();
    let adapter = builder.channel(channel.clone()).build().unwrap();

    assert!(adapter.request_init().await.is_err());
    assert_eq!(channel.state(), ComponentState::Closed);
}

#[tokio::test]
async fn unreachable_connection_leaves_no_dependent_behind() {
    let conn = Connection::new("db", TestTransport::unreachable(None))
        .unwrap()
        .with_error_handler(Arc::new(CloseDependents));
    let channel = Channel::builder("orders")
        .connection(conn.clone())
        .workflow(workflow(&TestConsumer::new("in")))
        .build()
        .unwrap();

    assert!(channel.request_start().await.is_err());
    assert_eq!(channel.state(), ComponentState::Closed);
    assert!(conn.dependents().is_empty());

    // A later failure report has nobody to close.
    conn.handle_connection_failure().await.unwrap();
    assert_eq!(channel.state(), ComponentState::Closed);
}

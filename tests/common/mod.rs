#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use flowvisor::{
    Consumer, Lifecycle, Message, MessageListener, ProcessingChain, ProcessingError, ProduceError,
    Producer, StepFn, Transport,
};
use parking_lot::Mutex;

/// Hook invocation counters.
#[derive(Default)]
pub struct Counts {
    pub init: AtomicUsize,
    pub start: AtomicUsize,
    pub stop: AtomicUsize,
    pub close: AtomicUsize,
}

impl Counts {
    pub fn snapshot(&self) -> [usize; 4] {
        [
            self.init.load(Ordering::SeqCst),
            self.start.load(Ordering::SeqCst),
            self.stop.load(Ordering::SeqCst),
            self.close.load(Ordering::SeqCst),
        ]
    }

    async fn hit(&self, counter: &AtomicUsize) -> anyhow::Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        // Widens the window for concurrent requests.
        tokio::task::yield_now().await;
        Ok(())
    }
}

pub struct TestConsumer {
    name: String,
    pub counts: Counts,
    pub close_delay: Option<Duration>,
    pub fail_init: bool,
    listener: Mutex<Option<Weak<dyn MessageListener>>>,
}

impl TestConsumer {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            counts: Counts::default(),
            close_delay: None,
            fail_init: false,
            listener: Mutex::new(None),
        })
    }

    /// A consumer whose init hook always fails.
    pub fn failing_init(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            counts: Counts::default(),
            close_delay: None,
            fail_init: true,
            listener: Mutex::new(None),
        })
    }

    /// A consumer whose close hook hangs for `delay`.
    pub fn slow_to_close(name: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            counts: Counts::default(),
            close_delay: Some(delay),
            fail_init: false,
            listener: Mutex::new(None),
        })
    }

    /// Delivers `msg` to the registered listener.
    pub async fn push(&self, msg: Message) {
        let listener = self.listener.lock().as_ref().and_then(Weak::upgrade);
        if let Some(listener) = listener {
            listener.on_message(msg).await;
        }
    }
}

#[async_trait]
impl Lifecycle for TestConsumer {
    async fn init(&self) -> anyhow::Result<()> {
        self.counts.hit(&self.counts.init).await?;
        if self.fail_init {
            anyhow::bail!("{}: broker rejected the subscription", self.name);
        }
        Ok(())
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.counts.hit(&self.counts.start).await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.counts.hit(&self.counts.stop).await
    }

    async fn close(&self) -> anyhow::Result<()> {
        if let Some(delay) = self.close_delay {
            tokio::time::sleep(delay).await;
        }
        self.counts.hit(&self.counts.close).await
    }
}

impl Consumer for TestConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_listener(&self, listener: Weak<dyn MessageListener>) {
        *self.listener.lock() = Some(listener);
    }
}

pub struct TestProducer {
    name: String,
    pub counts: Counts,
    pub fail: AtomicBool,
    pub attempts: AtomicUsize,
    pub produced: Mutex<Vec<Message>>,
    /// How long each produce or request takes.
    pub delay: Duration,
    /// Answer to `request`; `None` never answers.
    pub reply: Option<Message>,
}

impl TestProducer {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self::plain(name))
    }

    fn plain(name: &str) -> Self {
        Self {
            name: name.to_string(),
            counts: Counts::default(),
            fail: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            produced: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            reply: None,
        }
    }

    /// Fails every produce after holding it for `delay`.
    pub fn slow_failing(name: &str, delay: Duration) -> Arc<Self> {
        let p = Self {
            delay,
            ..Self::plain(name)
        };
        p.fail.store(true, Ordering::SeqCst);
        Arc::new(p)
    }

    /// Answers every request with `reply`, or never when `None`.
    pub fn replying(name: &str, reply: Option<Message>) -> Arc<Self> {
        Arc::new(Self {
            reply,
            ..Self::plain(name)
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        let p = Self::new(name);
        p.fail.store(true, Ordering::SeqCst);
        p
    }

    pub fn produced_count(&self) -> usize {
        self.produced.lock().len()
    }
}

#[async_trait]
impl Lifecycle for TestProducer {
    async fn init(&self) -> anyhow::Result<()> {
        self.counts.hit(&self.counts.init).await
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.counts.hit(&self.counts.start).await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.counts.hit(&self.counts.stop).await
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.counts.hit(&self.counts.close).await
    }
}

#[async_trait]
impl Producer for TestProducer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce(&self, msg: &Message) -> Result<(), ProduceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProduceError::failed(self.name.as_str(), "destination unavailable"));
        }
        self.produced.lock().push(msg.clone());
        Ok(())
    }

    async fn request(&self, msg: &Message, _timeout: Duration) -> Result<Message, ProduceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.produced.lock().push(msg.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => std::future::pending().await,
        }
    }
}

pub struct TestTransport {
    endpoint: Option<String>,
    pub counts: Counts,
    pub fail_init: bool,
}

impl TestTransport {
    pub fn new(endpoint: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            endpoint: endpoint.map(str::to_string),
            counts: Counts::default(),
            fail_init: false,
        })
    }

    /// A transport that can never connect.
    pub fn unreachable(endpoint: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            endpoint: endpoint.map(str::to_string),
            counts: Counts::default(),
            fail_init: true,
        })
    }
}

#[async_trait]
impl Lifecycle for TestTransport {
    async fn init(&self) -> anyhow::Result<()> {
        self.counts.hit(&self.counts.init).await?;
        if self.fail_init {
            anyhow::bail!("connection refused");
        }
        Ok(())
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.counts.hit(&self.counts.start).await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.counts.hit(&self.counts.stop).await
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.counts.hit(&self.counts.close).await
    }
}

impl Transport for TestTransport {
    fn endpoint(&self) -> Option<String> {
        self.endpoint.clone()
    }
}

/// A recovery chain that records every message it receives.
pub fn recording_chain() -> (ProcessingChain, Arc<Mutex<Vec<Message>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let chain = ProcessingChain::new().with_step(StepFn::arc("record", move |msg: Message| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().push(msg.clone());
            Ok::<_, ProcessingError>(msg)
        }
    }));
    (chain, seen)
}

/// Polls `cond` every 5ms for up to `limit`.
pub async fn eventually(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

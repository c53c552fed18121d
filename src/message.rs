//! # Messages flowing through workflows.
//!
//! A [`Message`] carries an immutable id, a byte payload, string metadata, the ordered
//! [`StepEvent`] markers recorded by the processing chain, and a skip-producer flag a step
//! may raise to suppress production.

use std::collections::BTreeMap;
use std::fmt;

use uuid::Uuid;

/// Metadata key carrying the id of the workflow a failed message came from.
pub const WORKFLOW_ID_KEY: &str = "flowvisor.workflow";
/// Metadata key carrying the failure reason attached before exception handling.
pub const FAILURE_REASON_KEY: &str = "flowvisor.failure";

/// Unique message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Marker recorded for every step that ran against a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepEvent {
    /// Step name.
    pub step: String,
    /// Whether the step succeeded.
    pub ok: bool,
}

/// A unit of work moving from a consumer to a producer.
#[derive(Debug, Clone)]
pub struct Message {
    id: MessageId,
    payload: Vec<u8>,
    metadata: BTreeMap<String, String>,
    events: Vec<StepEvent>,
    skip_producer: bool,
}

impl Message {
    /// Creates a message with a fresh id.
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: MessageId::new(),
            payload: payload.into(),
            metadata: BTreeMap::new(),
            events: Vec::new(),
            skip_producer: false,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload as UTF-8, if valid.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    pub fn set_payload(&mut self, payload: impl Into<Vec<u8>>) {
        self.payload = payload.into();
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn remove_metadata(&mut self, key: &str) -> Option<String> {
        self.metadata.remove(key)
    }

    /// All metadata, ordered by key.
    pub fn metadata_iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.metadata.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copies every entry of `other`'s metadata over this message's metadata.
    pub fn merge_metadata(&mut self, other: &Message) {
        for (k, v) in &other.metadata {
            self.metadata.insert(k.clone(), v.clone());
        }
    }

    pub fn events(&self) -> &[StepEvent] {
        &self.events
    }

    pub(crate) fn record_event(&mut self, step: &str, ok: bool) {
        self.events.push(StepEvent {
            step: step.to_string(),
            ok,
        });
    }

    /// Tells the workflow not to produce this message.
    pub fn skip_producer(&mut self) {
        self.skip_producer = true;
    }

    pub fn is_producer_skipped(&self) -> bool {
        self.skip_producer
    }
}

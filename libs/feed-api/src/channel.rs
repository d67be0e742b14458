use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

// ════════════════════════════════════════════════════════════════
//  Policies
// ════════════════════════════════════════════════════════════════

/// Стратегия поведения при переполнении bounded очереди consumer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// try_send(): очередь полна — дропнуть сообщение, залогировать.
    #[default]
    Drop,
    /// .send().await: ждать пока появится место (back-pressure).
    #[serde(alias = "backpressure")]
    BackPressure,
}

/// Where a consumer group with no position starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetReset {
    /// Replay everything the channel still retains.
    #[default]
    Earliest,
    /// Only records published after the group was created.
    Latest,
}

// ════════════════════════════════════════════════════════════════
//  Wire units
// ════════════════════════════════════════════════════════════════

/// One unit placed on or read from the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub topic: String,
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
    /// Partition hint. `None` on the way out lets the channel pick one.
    pub partition: Option<i32>,
}

impl Envelope {
    pub fn new(topic: impl Into<String>, key: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            payload: payload.into(),
            partition: None,
        }
    }

    /// Key for logging.
    pub fn key_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }
}

/// Asynchronous outcome of one earlier `Publisher::publish` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub topic: String,
    pub key: Vec<u8>,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
    pub error: Option<String>,
}

impl DeliveryReport {
    pub fn delivered(envelope: &Envelope, partition: i32, offset: i64) -> Self {
        Self {
            topic: envelope.topic.clone(),
            key: envelope.key.clone(),
            partition: Some(partition),
            offset: Some(offset),
            error: None,
        }
    }

    pub fn failed(envelope: &Envelope, error: impl Into<String>) -> Self {
        Self {
            topic: envelope.topic.clone(),
            key: envelope.key.clone(),
            partition: envelope.partition,
            offset: None,
            error: Some(error.into()),
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn key_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }
}

/// Result of a single bounded `Subscriber::poll`.
#[derive(Debug)]
pub enum PollOutcome {
    Message(Envelope),
    TimedOut,
    Error(ChannelError),
}

// ════════════════════════════════════════════════════════════════
//  Channel traits
// ════════════════════════════════════════════════════════════════

/// Lazy, possibly infinite stream of delivery reports.
/// `None` = publisher закрыт, отчётов больше не будет.
pub trait DeliveryReportStream: Send {
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Option<DeliveryReport>> + Send + '_>>;
}

/// Outbound side of the message channel. Shared between the producer's
/// dispatch task and its report monitor, hence `Sync`.
pub trait Publisher: Send + Sync {
    /// Enqueue into the local send buffer. `Ok` means queued, not delivered.
    fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> Result<(), ChannelError>;

    /// Take the delivery report stream. Only the first call returns `Some`.
    fn delivery_reports(&self) -> Option<Box<dyn DeliveryReportStream>>;

    /// Wait until every queued message has been delivered or `timeout`
    /// elapses. Returns `true` when the buffer drained completely.
    fn flush(&self, timeout: Duration) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;

    /// Release the connection and end the report stream. Call after `flush`.
    /// Calling it twice is a no-op.
    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Inbound side of the message channel. Owned by a single consumer loop.
pub trait Subscriber: Send {
    fn subscribe<'a>(
        &'a mut self,
        topics: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<(), ChannelError>> + Send + 'a>>;

    /// Wait at most `timeout` for the next message.
    fn poll(&mut self, timeout: Duration) -> Pin<Box<dyn Future<Output = PollOutcome> + Send + '_>>;

    /// Leave the channel. Calling it twice is a no-op.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), ChannelError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_constructors() {
        let env = Envelope::new("t", b"k".to_vec(), b"{}".to_vec());
        let ok = DeliveryReport::delivered(&env, 2, 10);
        assert!(ok.success());
        assert_eq!(ok.partition, Some(2));
        assert_eq!(ok.offset, Some(10));

        let bad = DeliveryReport::failed(&env, "broker down");
        assert!(!bad.success());
        assert_eq!(bad.key_str(), "k");
        assert_eq!(bad.offset, None);
    }

    #[test]
    fn policies_parse_from_snake_case() {
        let p: OverflowPolicy = serde_json::from_str("\"back_pressure\"").unwrap();
        assert_eq!(p, OverflowPolicy::BackPressure);
        let p: OverflowPolicy = serde_json::from_str("\"backpressure\"").unwrap();
        assert_eq!(p, OverflowPolicy::BackPressure);
        let r: OffsetReset = serde_json::from_str("\"latest\"").unwrap();
        assert_eq!(r, OffsetReset::Latest);
    }
}

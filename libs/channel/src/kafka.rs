//! Kafka backend for the channel contract (feature `kafka`).
//!
//! Properties are passed to librdkafka verbatim, so any client setting
//! (`bootstrap.servers`, `security.protocol`, `sasl.*`, ...) works without
//! code changes.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rdkafka::ClientConfig;
use rdkafka::ClientContext;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use rdkafka::util::Timeout;
use tokio::sync::mpsc;

use feed_api::{
    ChannelError, DeliveryReport, DeliveryReportStream, Envelope, OffsetReset, PollOutcome,
    Publisher, Subscriber,
};

use crate::ReportStream;

fn client_config(props: &BTreeMap<String, String>) -> ClientConfig {
    let mut cfg = ClientConfig::new();
    for (k, v) in props {
        cfg.set(k, v);
    }
    cfg
}

/// librdkafka reports -1 (`RD_KAFKA_PARTITION_UA`) until a partition is assigned.
fn assigned_partition(partition: i32) -> Option<i32> {
    (partition >= 0).then_some(partition)
}

// ═══════════════════════════════════════════════════════════════
//  Producer
// ═══════════════════════════════════════════════════════════════

/// librdkafka calls `delivery` from the producer's polling thread.
pub struct ReportingContext {
    tx: Mutex<Option<mpsc::UnboundedSender<DeliveryReport>>>,
}

impl ClientContext for ReportingContext {}

impl ProducerContext for ReportingContext {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _: Self::DeliveryOpaque) {
        let report = match result {
            Ok(msg) => DeliveryReport {
                topic: msg.topic().to_string(),
                key: msg.key().unwrap_or_default().to_vec(),
                partition: Some(msg.partition()),
                offset: Some(msg.offset()),
                error: None,
            },
            Err((e, msg)) => DeliveryReport {
                topic: msg.topic().to_string(),
                key: msg.key().unwrap_or_default().to_vec(),
                partition: assigned_partition(msg.partition()),
                offset: None,
                error: Some(e.to_string()),
            },
        };
        if let Some(tx) = self.tx.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            let _ = tx.send(report);
        }
    }
}

type KafkaProducer = ThreadedProducer<ReportingContext>;

/// `close` drops the librdkafka producer, which ends the connection and
/// the report stream.
pub struct KafkaPublisher {
    producer: Mutex<Option<Arc<KafkaProducer>>>,
    reports: Mutex<Option<ReportStream>>,
}

impl KafkaPublisher {
    pub fn new(props: &BTreeMap<String, String>) -> Result<Self, ChannelError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let context = ReportingContext {
            tx: Mutex::new(Some(tx)),
        };
        let producer: KafkaProducer = client_config(props)
            .create_with_context(context)
            .map_err(|e| ChannelError::Unreachable(format!("create producer: {e}")))?;
        tracing::info!(servers = ?props.get("bootstrap.servers"), "kafka producer created");
        Ok(Self {
            producer: Mutex::new(Some(Arc::new(producer))),
            reports: Mutex::new(Some(ReportStream::from_receiver(rx))),
        })
    }

    fn producer(&self) -> Option<Arc<KafkaProducer>> {
        self.producer.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Publisher for KafkaPublisher {
    fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> Result<(), ChannelError> {
        let Some(producer) = self.producer() else {
            return Err(ChannelError::Closed("publisher"));
        };
        let record: BaseRecord<'_, [u8], [u8]> = BaseRecord::to(topic).key(key).payload(payload);
        producer.send(record).map_err(|(e, _)| match e {
            KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull) => ChannelError::QueueFull,
            other => ChannelError::Transport(other.to_string()),
        })
    }

    fn delivery_reports(&self) -> Option<Box<dyn DeliveryReportStream>> {
        let stream = self.reports.lock().unwrap_or_else(PoisonError::into_inner).take()?;
        Some(Box::new(stream))
    }

    fn flush(&self, timeout: Duration) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        let producer = self.producer();
        Box::pin(async move {
            let Some(producer) = producer else {
                return true;
            };
            match tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout))).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "kafka flush incomplete");
                    false
                }
                Err(e) => {
                    tracing::error!(error = %e, "kafka flush task failed");
                    false
                }
            }
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let taken = self.producer.lock().unwrap_or_else(PoisonError::into_inner).take();
            let Some(producer) = taken else {
                return;
            };
            producer
                .context()
                .tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            // Dropping the client joins its polling thread.
            if let Err(e) = tokio::task::spawn_blocking(move || drop(producer)).await {
                tracing::error!(error = %e, "kafka producer shutdown failed");
            }
            tracing::info!("kafka producer closed");
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Consumer
// ═══════════════════════════════════════════════════════════════

pub struct KafkaSubscriber {
    consumer: Arc<BaseConsumer>,
    closed: bool,
}

impl KafkaSubscriber {
    pub fn new(
        props: &BTreeMap<String, String>,
        group_id: &str,
        reset: OffsetReset,
    ) -> Result<Self, ChannelError> {
        let mut cfg = client_config(props);
        cfg.set("group.id", group_id);
        cfg.set(
            "auto.offset.reset",
            match reset {
                OffsetReset::Earliest => "earliest",
                OffsetReset::Latest => "latest",
            },
        );
        let consumer: BaseConsumer = cfg
            .create()
            .map_err(|e| ChannelError::Unreachable(format!("create consumer: {e}")))?;
        Ok(Self {
            consumer: Arc::new(consumer),
            closed: false,
        })
    }
}

impl Subscriber for KafkaSubscriber {
    fn subscribe<'a>(
        &'a mut self,
        topics: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<(), ChannelError>> + Send + 'a>> {
        Box::pin(async move {
            let names: Vec<&str> = topics.iter().map(String::as_str).collect();
            self.consumer
                .subscribe(&names)
                .map_err(|e| ChannelError::Subscription {
                    topic: topics.join(","),
                    detail: e.to_string(),
                })
        })
    }

    fn poll(&mut self, timeout: Duration) -> Pin<Box<dyn Future<Output = PollOutcome> + Send + '_>> {
        let consumer = self.consumer.clone();
        let closed = self.closed;
        Box::pin(async move {
            if closed {
                return PollOutcome::Error(ChannelError::Closed("subscriber"));
            }
            let polled = tokio::task::spawn_blocking(move || match consumer.poll(timeout) {
                None => PollOutcome::TimedOut,
                Some(Ok(msg)) => PollOutcome::Message(Envelope {
                    topic: msg.topic().to_string(),
                    key: msg.key().unwrap_or_default().to_vec(),
                    payload: msg.payload().unwrap_or_default().to_vec(),
                    partition: Some(msg.partition()),
                }),
                Some(Err(e)) => PollOutcome::Error(ChannelError::Transport(e.to_string())),
            })
            .await;
            polled.unwrap_or_else(|e| PollOutcome::Error(ChannelError::Transport(e.to_string())))
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), ChannelError>> + Send + '_>> {
        Box::pin(async move {
            if !self.closed {
                self.closed = true;
                self.consumer.unsubscribe();
                tracing::info!("kafka consumer closed");
            }
            Ok(())
        })
    }
}

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use feed_api::{ChannelError, DeliveryReport, DeliveryReportStream, Envelope, Publisher};

use crate::Broker;

// ═══════════════════════════════════════════════════════════════
//  Delivery report stream
// ═══════════════════════════════════════════════════════════════

pub struct ReportStream {
    rx: mpsc::UnboundedReceiver<DeliveryReport>,
}

impl ReportStream {
    pub fn from_receiver(rx: mpsc::UnboundedReceiver<DeliveryReport>) -> Self {
        Self { rx }
    }
}

impl DeliveryReportStream for ReportStream {
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Option<DeliveryReport>> + Send + '_>> {
        Box::pin(async { self.rx.recv().await })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryPublisher
// ═══════════════════════════════════════════════════════════════

/// In-flight accounting shared with the delivery worker.
struct InFlight {
    count: AtomicUsize,
    drained: Notify,
}

impl InFlight {
    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }
}

/// Publisher over the in-process broker.
///
/// `publish` only places the envelope into a bounded local queue. A worker
/// task moves queued envelopes into the broker and emits one
/// `DeliveryReport` per envelope; the report stream ends once the publisher
/// is closed and the queue has drained.
pub struct MemoryPublisher {
    tx: Mutex<Option<mpsc::Sender<Envelope>>>,
    reports: Mutex<Option<ReportStream>>,
    in_flight: Arc<InFlight>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryPublisher {
    pub(crate) fn new(broker: Arc<Broker>, send_buffer: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Envelope>(send_buffer.max(1));
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let in_flight = Arc::new(InFlight {
            count: AtomicUsize::new(0),
            drained: Notify::new(),
        });

        let worker_in_flight = in_flight.clone();
        let worker = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let report = match broker.deliver(envelope.clone()).await {
                    Ok((partition, offset)) => DeliveryReport::delivered(&envelope, partition, offset),
                    Err(e) => DeliveryReport::failed(&envelope, e.to_string()),
                };
                // Нет читателя отчётов — не ошибка.
                let _ = report_tx.send(report);
                worker_in_flight.done();
            }
            tracing::debug!("publisher worker stopped");
        });

        Self {
            tx: Mutex::new(Some(tx)),
            reports: Mutex::new(Some(ReportStream { rx: report_rx })),
            in_flight,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Envelopes enqueued but not yet reported.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::Acquire)
    }
}

impl Publisher for MemoryPublisher {
    fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> Result<(), ChannelError> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return Err(ChannelError::Closed("publisher"));
        };

        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        match tx.try_send(Envelope::new(topic, key, payload)) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.in_flight.done();
                match e {
                    mpsc::error::TrySendError::Full(_) => Err(ChannelError::QueueFull),
                    mpsc::error::TrySendError::Closed(_) => Err(ChannelError::Closed("publisher")),
                }
            }
        }
    }

    fn delivery_reports(&self) -> Option<Box<dyn DeliveryReportStream>> {
        let stream = self.reports.lock().unwrap_or_else(PoisonError::into_inner).take()?;
        Some(Box::new(stream))
    }

    fn flush(&self, timeout: Duration) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                let drained = self.in_flight.drained.notified();
                if self.in_flight() == 0 {
                    return true;
                }
                if tokio::time::timeout_at(deadline, drained).await.is_err() {
                    return self.in_flight() == 0;
                }
            }
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            // Dropping the sender lets the worker finish the queue and exit,
            // which in turn closes the report stream.
            let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
            if tx.is_none() {
                return;
            }
            drop(tx);

            let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(worker) = worker {
                // Anything still queued after flush is dropped, including a
                // delivery blocked on a full group queue.
                let pending = self.in_flight();
                if pending > 0 {
                    tracing::warn!(pending, "closing publisher with undelivered messages");
                    worker.abort();
                }
                match worker.await {
                    Ok(()) => {}
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => tracing::error!(error = %e, "publisher worker failed"),
                }
            }
            tracing::info!("publisher closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use feed_api::Publisher;

    use super::*;
    use crate::{Broker, BrokerConfig};

    #[tokio::test]
    async fn reports_follow_publishes_and_end_on_close() {
        let broker = Broker::new(BrokerConfig::default());
        let publisher = broker.publisher(8);
        let mut reports = publisher.delivery_reports().unwrap();
        assert!(publisher.delivery_reports().is_none());

        publisher.publish("t", b"a", b"1").unwrap();
        publisher.publish("t", b"b", b"2").unwrap();
        assert!(publisher.flush(Duration::from_secs(1)).await);
        publisher.close().await;

        let mut keys = Vec::new();
        while let Some(r) = reports.next().await {
            assert!(r.success());
            keys.push(r.key);
        }
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[tokio::test]
    async fn publish_after_close_fails() {
        let broker = Broker::new(BrokerConfig::default());
        let publisher = broker.publisher(8);
        publisher.close().await;
        publisher.close().await;
        assert_eq!(publisher.publish("t", b"k", b"v"), Err(ChannelError::Closed("publisher")));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn saturated_buffer_reports_queue_full() {
        let broker = Broker::new(BrokerConfig::default());
        let publisher = broker.publisher(2);
        // current_thread: the worker cannot run until we yield.
        publisher.publish("t", b"1", b"v").unwrap();
        publisher.publish("t", b"2", b"v").unwrap();
        assert_eq!(publisher.publish("t", b"3", b"v"), Err(ChannelError::QueueFull));
        assert_eq!(publisher.in_flight(), 2);

        assert!(publisher.flush(Duration::from_secs(1)).await);
        assert_eq!(publisher.in_flight(), 0);
        assert_eq!(broker.retained("t").await, 2);
    }

    #[tokio::test]
    async fn close_drops_delivery_blocked_on_full_group() {
        let broker = Broker::new(BrokerConfig {
            group_buffer: 1,
            overflow: feed_api::OverflowPolicy::BackPressure,
            ..BrokerConfig::default()
        });
        let mut sub = broker.subscriber("idle", feed_api::OffsetReset::Latest);
        feed_api::Subscriber::subscribe(&mut sub, &["t".to_string()]).await.unwrap();

        let publisher = broker.publisher(8);
        let mut reports = publisher.delivery_reports().unwrap();
        for key in [b"1", b"2", b"3"] {
            publisher.publish("t", key, b"v").unwrap();
        }
        assert!(!publisher.flush(Duration::from_millis(50)).await);

        publisher.close().await;
        let mut delivered = 0;
        while reports.next().await.is_some() {
            delivered += 1;
        }
        assert!(delivered < 3);
    }

    #[tokio::test]
    async fn flush_on_idle_publisher_is_immediate() {
        let broker = Broker::new(BrokerConfig::default());
        let publisher = broker.publisher(8);
        assert!(publisher.flush(Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn delivery_fails_after_broker_shutdown() {
        let broker = Broker::new(BrokerConfig::default());
        let publisher = broker.publisher(8);
        let mut reports = publisher.delivery_reports().unwrap();
        broker.shutdown().await;

        publisher.publish("t", b"k", b"v").unwrap();
        let report = reports.next().await.unwrap();
        assert!(!report.success());
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use feed_api::{DeliveryReportStream, Publisher};

use crate::codec::JsonCodec;
use crate::error::FeedError;
use crate::factory::RecordFactory;

pub const DEFAULT_TOPIC: &str = "football-match-new";

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub topic: String,
    /// Period between publishes; the first tick fires one period after start.
    pub interval: Duration,
    pub flush_timeout: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.into(),
            interval: Duration::from_secs(3),
            flush_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Running,
    Draining,
    Closed,
}

/// Counters reported when the producer loop exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProducerStats {
    pub published: u64,
    pub encode_failed: u64,
    pub enqueue_failed: u64,
    pub delivered: u64,
    pub delivery_failed: u64,
    /// `flush` drained the send buffer before its timeout.
    pub drained: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct DeliveryStats {
    delivered: u64,
    failed: u64,
}

// ═══════════════════════════════════════════════════════════════
//  ProducerLoop
// ═══════════════════════════════════════════════════════════════

/// Periodic match publisher: `Running → Draining → Closed`.
///
/// Each scheduling decision picks either the next publish or the start of
/// draining; cancellation wins when both are ready, and nothing is
/// published once draining has begun. Delivery reports are drained by a
/// separate monitor task for the whole lifetime of the loop.
pub struct ProducerLoop {
    publisher: Arc<dyn Publisher>,
    factory: RecordFactory,
    codec: JsonCodec,
    config: ProducerConfig,
    shutdown: CancellationToken,
    state: watch::Sender<ProducerState>,
}

impl ProducerLoop {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        factory: RecordFactory,
        config: ProducerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(ProducerState::Running);
        Self {
            publisher,
            factory,
            codec: JsonCodec,
            config,
            shutdown,
            state,
        }
    }

    pub fn state(&self) -> watch::Receiver<ProducerState> {
        self.state.subscribe()
    }

    pub async fn run(self) -> Result<ProducerStats, FeedError> {
        let reports = self.publisher.delivery_reports().ok_or(FeedError::ReportsTaken)?;
        let monitor = spawn_monitor(reports);

        let period = self.config.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            topic = %self.config.topic,
            interval_ms = period.as_millis() as u64,
            "producer running"
        );

        let mut stats = ProducerStats::default();
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => self.publish_next(&mut stats),
            }
        }

        self.state.send_replace(ProducerState::Draining);
        tracing::info!("shutdown requested, draining producer");

        stats.drained = self.publisher.flush(self.config.flush_timeout).await;
        if !stats.drained {
            tracing::warn!(
                timeout_ms = self.config.flush_timeout.as_millis() as u64,
                "flush timed out, undelivered messages dropped"
            );
        }
        self.publisher.close().await;

        match monitor.await {
            Ok(delivery) => {
                stats.delivered = delivery.delivered;
                stats.delivery_failed = delivery.failed;
            }
            Err(e) => tracing::error!(error = %e, "delivery monitor failed"),
        }

        self.state.send_replace(ProducerState::Closed);
        tracing::info!(
            published = stats.published,
            delivered = stats.delivered,
            delivery_failed = stats.delivery_failed,
            enqueue_failed = stats.enqueue_failed,
            "producer closed"
        );
        Ok(stats)
    }

    fn publish_next(&self, stats: &mut ProducerStats) {
        let record = self.factory.create();
        let payload = match self.codec.encode(&record) {
            Ok(p) => p,
            Err(e) => {
                stats.encode_failed += 1;
                tracing::error!(id = %record.id, error = %e, "failed to encode match");
                return;
            }
        };

        match self.publisher.publish(&self.config.topic, &record.key(), &payload) {
            Ok(()) => {
                stats.published += 1;
                tracing::info!(
                    topic = %self.config.topic,
                    key = %record.id,
                    home = %record.home_team.name,
                    away = %record.away_team.name,
                    competition = %record.competition,
                    "match published"
                );
            }
            Err(e) => {
                stats.enqueue_failed += 1;
                tracing::warn!(topic = %self.config.topic, key = %record.id, error = %e, "failed to enqueue match");
            }
        }
    }
}

/// Drains the report stream until the publisher closes it.
fn spawn_monitor(mut reports: Box<dyn DeliveryReportStream>) -> JoinHandle<DeliveryStats> {
    tokio::spawn(async move {
        let mut stats = DeliveryStats::default();
        while let Some(report) = reports.next().await {
            match report.error {
                None => {
                    stats.delivered += 1;
                    tracing::info!(
                        topic = %report.topic,
                        key = %report.key_str(),
                        partition = ?report.partition,
                        offset = ?report.offset,
                        "match delivered"
                    );
                }
                Some(ref e) => {
                    stats.failed += 1;
                    tracing::warn!(topic = %report.topic, key = %report.key_str(), error = %e, "delivery failed");
                }
            }
        }
        tracing::debug!("delivery report stream ended");
        stats
    })
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    use feed_api::{ChannelError, DeliveryReport, Envelope};
    use tokio::sync::mpsc;

    use super::*;
    use crate::catalog::Catalog;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Publish { at: Instant, key: Vec<u8> },
        Flush,
        Close,
    }

    struct ReportRx(mpsc::UnboundedReceiver<DeliveryReport>);

    impl DeliveryReportStream for ReportRx {
        fn next(&mut self) -> Pin<Box<dyn Future<Output = Option<DeliveryReport>> + Send + '_>> {
            Box::pin(async { self.0.recv().await })
        }
    }

    /// Records every call; reports each publish as delivered, or fails
    /// publishes when `reject` is set.
    struct RecordingPublisher {
        calls: Mutex<Vec<Call>>,
        tx: Mutex<Option<mpsc::UnboundedSender<DeliveryReport>>>,
        rx: Mutex<Option<ReportRx>>,
        reject: bool,
    }

    impl RecordingPublisher {
        fn new(reject: bool) -> Arc<Self> {
            let (tx, rx) = mpsc::unbounded_channel();
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                tx: Mutex::new(Some(tx)),
                rx: Mutex::new(Some(ReportRx(rx))),
                reject,
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Publisher for RecordingPublisher {
        fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> Result<(), ChannelError> {
            self.calls.lock().unwrap().push(Call::Publish {
                at: Instant::now(),
                key: key.to_vec(),
            });
            if self.reject {
                return Err(ChannelError::QueueFull);
            }
            if let Some(tx) = self.tx.lock().unwrap().as_ref() {
                let env = Envelope::new(topic, key, payload);
                let _ = tx.send(DeliveryReport::delivered(&env, 0, 0));
            }
            Ok(())
        }

        fn delivery_reports(&self) -> Option<Box<dyn DeliveryReportStream>> {
            let rx = self.rx.lock().unwrap().take()?;
            Some(Box::new(rx))
        }

        fn flush(&self, _timeout: Duration) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(Call::Flush);
                true
            })
        }

        fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(Call::Close);
                self.tx.lock().unwrap().take();
            })
        }
    }

    fn producer(publisher: Arc<RecordingPublisher>, shutdown: CancellationToken) -> ProducerLoop {
        let factory = RecordFactory::seeded(Arc::new(Catalog::football().unwrap()), 3);
        ProducerLoop::new(publisher, factory, ProducerConfig::default(), shutdown)
    }

    #[tokio::test(start_paused = true)]
    async fn nine_second_window_publishes_three_times_then_drains() {
        let publisher = RecordingPublisher::new(false);
        let shutdown = CancellationToken::new();
        let started = Instant::now();
        let handle = tokio::spawn(producer(publisher.clone(), shutdown.clone()).run());

        tokio::time::sleep(Duration::from_millis(9_500)).await;
        shutdown.cancel();
        let stats = handle.await.unwrap().unwrap();

        let calls = publisher.calls();
        assert_eq!(calls.len(), 5, "{calls:?}");
        for (i, call) in calls[..3].iter().enumerate() {
            let Call::Publish { at, key } = call else {
                panic!("expected publish, got {call:?}");
            };
            assert!(uuid::Uuid::try_parse_ascii(key).is_ok());
            assert_eq!(at.duration_since(started), Duration::from_secs(3 * (i as u64 + 1)));
        }
        assert_eq!(calls[3], Call::Flush);
        assert_eq!(calls[4], Call::Close);

        assert_eq!(stats.published, 3);
        assert_eq!(stats.delivered, 3);
        assert!(stats.drained);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_published_after_draining_begins() {
        let publisher = RecordingPublisher::new(false);
        let shutdown = CancellationToken::new();
        let producer = producer(publisher.clone(), shutdown.clone());
        let mut state = producer.state();
        let handle = tokio::spawn(producer.run());

        tokio::time::sleep(Duration::from_millis(6_100)).await;
        shutdown.cancel();
        state.wait_for(|s| *s == ProducerState::Closed).await.unwrap();
        handle.await.unwrap().unwrap();

        // Timer keeps running; the loop must not.
        tokio::time::sleep(Duration::from_secs(30)).await;
        let calls = publisher.calls();
        let flush_at = calls.iter().position(|c| *c == Call::Flush).unwrap();
        assert!(calls[flush_at..].iter().all(|c| !matches!(c, Call::Publish { .. })));
        assert_eq!(flush_at, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_drains_without_publishing() {
        let publisher = RecordingPublisher::new(false);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let stats = producer(publisher.clone(), shutdown).run().await.unwrap();
        assert_eq!(stats.published, 0);
        assert_eq!(publisher.calls(), vec![Call::Flush, Call::Close]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_shutdown_after_close_has_no_effect() {
        let publisher = RecordingPublisher::new(false);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(producer(publisher.clone(), shutdown.clone()).run());

        tokio::time::sleep(Duration::from_millis(3_100)).await;
        shutdown.cancel();
        handle.await.unwrap().unwrap();
        let after_close = publisher.calls();

        shutdown.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(publisher.calls(), after_close);
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_errors_are_counted_and_skipped() {
        let publisher = RecordingPublisher::new(true);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(producer(publisher.clone(), shutdown.clone()).run());

        tokio::time::sleep(Duration::from_millis(6_500)).await;
        shutdown.cancel();
        let stats = handle.await.unwrap().unwrap();

        assert_eq!(stats.enqueue_failed, 2);
        assert_eq!(stats.published, 0);
        assert_eq!(stats.delivered, 0);
    }

    #[tokio::test]
    async fn taken_report_stream_is_an_error() {
        let publisher = RecordingPublisher::new(false);
        let _stolen = publisher.delivery_reports();
        let res = producer(publisher, CancellationToken::new()).run().await;
        assert!(matches!(res, Err(FeedError::ReportsTaken)));
    }
}

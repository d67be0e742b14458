use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use feed_api::{Envelope, MatchHandler, PollOutcome, Subscriber};

use crate::codec::JsonCodec;
use crate::error::FeedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Running,
    Closed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub handled: u64,
    pub ignored: u64,
    pub decode_failed: u64,
    pub handler_failed: u64,
    pub poll_errors: u64,
}

// ═══════════════════════════════════════════════════════════════
//  ConsumerLoop
// ═══════════════════════════════════════════════════════════════

/// Poll → decode → dispatch loop over a single subscriber.
///
/// Shutdown is checked at the top of every iteration, so it is observed
/// within one poll timeout. Decode and handler failures drop the message
/// and the loop goes on; each message reaches its handler at most once.
pub struct ConsumerLoop {
    subscriber: Box<dyn Subscriber>,
    routes: HashMap<String, Arc<dyn MatchHandler>>,
    codec: JsonCodec,
    poll_timeout: Duration,
    shutdown: CancellationToken,
    state: watch::Sender<ConsumerState>,
}

impl ConsumerLoop {
    pub fn new(subscriber: Box<dyn Subscriber>, shutdown: CancellationToken) -> Self {
        let (state, _) = watch::channel(ConsumerState::Running);
        Self {
            subscriber,
            routes: HashMap::new(),
            codec: JsonCodec,
            poll_timeout: Duration::from_millis(1000),
            shutdown,
            state,
        }
    }

    /// Route decoded matches from `topic` to `handler`.
    pub fn route(mut self, topic: impl Into<String>, handler: Arc<dyn MatchHandler>) -> Self {
        self.routes.insert(topic.into(), handler);
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    pub async fn run(mut self) -> Result<ConsumerStats, FeedError> {
        if self.routes.is_empty() {
            return Err(FeedError::NoRoutes);
        }
        let mut topics: Vec<String> = self.routes.keys().cloned().collect();
        topics.sort();

        self.subscriber
            .subscribe(&topics)
            .await
            .map_err(FeedError::Subscription)?;
        tracing::info!(topics = ?topics, "consumer running");

        let mut stats = ConsumerStats::default();
        let outcome = loop {
            if self.shutdown.is_cancelled() {
                tracing::info!("shutdown requested, closing consumer");
                break Ok(());
            }

            match self.subscriber.poll(self.poll_timeout).await {
                PollOutcome::TimedOut => {}
                PollOutcome::Message(envelope) => {
                    dispatch(&self.routes, self.codec, envelope, &mut stats).await
                }
                PollOutcome::Error(e) if e.is_fatal() => {
                    stats.poll_errors += 1;
                    tracing::error!(error = %e, "channel lost, closing consumer");
                    break Err(FeedError::ChannelLost(e));
                }
                PollOutcome::Error(e) => {
                    stats.poll_errors += 1;
                    tracing::error!(error = %e, "poll failed");
                }
            }
        };

        if let Err(e) = self.subscriber.close().await {
            tracing::warn!(error = %e, "failed to close subscriber");
        }
        self.state.send_replace(ConsumerState::Closed);
        tracing::info!(
            received = stats.received,
            handled = stats.handled,
            decode_failed = stats.decode_failed,
            handler_failed = stats.handler_failed,
            "consumer closed"
        );

        outcome.map(|()| stats)
    }
}

/// Route one envelope to its topic handler and update `stats`.
async fn dispatch(
    routes: &HashMap<String, Arc<dyn MatchHandler>>,
    codec: JsonCodec,
    envelope: Envelope,
    stats: &mut ConsumerStats,
) {
    stats.received += 1;

    let Some(handler) = routes.get(&envelope.topic) else {
        stats.ignored += 1;
        tracing::trace!(topic = %envelope.topic, "no route for topic, message ignored");
        return;
    };

    tracing::debug!(
        topic = %envelope.topic,
        key = %envelope.key_str(),
        partition = ?envelope.partition,
        "message received"
    );

    let record = match codec.decode(&envelope.payload) {
        Ok(r) => r,
        Err(e) => {
            stats.decode_failed += 1;
            tracing::error!(topic = %envelope.topic, key = %envelope.key_str(), error = %e, "failed to decode match");
            return;
        }
    };

    match handler.handle(&record).await {
        Ok(()) => stats.handled += 1,
        Err(e) => {
            stats.handler_failed += 1;
            tracing::error!(topic = %envelope.topic, id = %record.id, error = %e, "handler failed");
        }
    }
}

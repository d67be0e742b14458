use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use feed_api::{ChannelError, OffsetReset, PollOutcome, Subscriber};

use crate::{Broker, GroupReceiver};

/// Consumer-group member over the in-process broker.
pub struct MemorySubscriber {
    broker: Arc<Broker>,
    group_id: String,
    reset: OffsetReset,
    queue: Option<GroupReceiver>,
    closed: bool,
}

impl MemorySubscriber {
    pub(crate) fn new(broker: Arc<Broker>, group_id: String, reset: OffsetReset) -> Self {
        Self {
            broker,
            group_id,
            reset,
            queue: None,
            closed: false,
        }
    }
}

impl Subscriber for MemorySubscriber {
    fn subscribe<'a>(
        &'a mut self,
        topics: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<(), ChannelError>> + Send + 'a>> {
        Box::pin(async move {
            if self.closed {
                return Err(ChannelError::Closed("subscriber"));
            }
            let already_member = self.queue.is_some();
            let queue = self.broker.join_group(&self.group_id, topics, self.reset).await?;
            if already_member {
                // Re-subscribe only extends the topic set.
                self.broker.leave_group(&self.group_id).await;
            }
            self.queue = Some(queue);
            Ok(())
        })
    }

    fn poll(&mut self, timeout: Duration) -> Pin<Box<dyn Future<Output = PollOutcome> + Send + '_>> {
        Box::pin(async move {
            if self.closed {
                return PollOutcome::Error(ChannelError::Closed("subscriber"));
            }
            let Some(queue) = self.queue.clone() else {
                return PollOutcome::Error(ChannelError::Subscription {
                    topic: String::new(),
                    detail: "poll before subscribe".into(),
                });
            };

            // Ожидание lock'а (другой участник группы) входит в timeout.
            let recv = async move {
                let mut rx = queue.lock().await;
                rx.recv().await
            };
            match tokio::time::timeout(timeout, recv).await {
                Ok(Some(envelope)) => PollOutcome::Message(envelope),
                Ok(None) => PollOutcome::Error(ChannelError::Closed("channel")),
                Err(_) => PollOutcome::TimedOut,
            }
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), ChannelError>> + Send + '_>> {
        Box::pin(async move {
            if self.closed {
                return Ok(());
            }
            self.closed = true;
            if self.queue.take().is_some() {
                self.broker.leave_group(&self.group_id).await;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use feed_api::Subscriber;

    use super::*;
    use crate::BrokerConfig;

    #[tokio::test]
    async fn poll_before_subscribe_is_an_error() {
        let broker = Broker::new(BrokerConfig::default());
        let mut sub = broker.subscriber("g", OffsetReset::Latest);
        assert!(matches!(
            sub.poll(Duration::from_millis(10)).await,
            PollOutcome::Error(ChannelError::Subscription { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_queue_times_out() {
        let broker = Broker::new(BrokerConfig::default());
        let mut sub = broker.subscriber("g", OffsetReset::Latest);
        sub.subscribe(&["t".to_string()]).await.unwrap();
        assert!(matches!(sub.poll(Duration::from_millis(1000)).await, PollOutcome::TimedOut));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let broker = Broker::new(BrokerConfig::default());
        let mut sub = broker.subscriber("g", OffsetReset::Latest);
        sub.subscribe(&["t".to_string()]).await.unwrap();
        sub.close().await.unwrap();
        sub.close().await.unwrap();
        assert!(matches!(
            sub.poll(Duration::from_millis(10)).await,
            PollOutcome::Error(ChannelError::Closed("subscriber"))
        ));
    }
}

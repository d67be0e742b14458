pub mod partitioner;
mod publisher;
mod subscriber;

#[cfg(feature = "kafka")]
pub mod kafka;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, RwLock, mpsc};

use feed_api::{ChannelError, Envelope, OffsetReset, OverflowPolicy};

pub use publisher::{MemoryPublisher, ReportStream};
pub use subscriber::MemorySubscriber;

use partitioner::compute_partition;

pub(crate) type GroupReceiver = Arc<Mutex<mpsc::Receiver<Envelope>>>;

// ═══════════════════════════════════════════════════════════════
//  BrokerConfig
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Partitions per topic (only affects keys/offsets in reports).
    pub partitions: i32,
    /// Records retained per topic for `OffsetReset::Earliest` replay.
    pub retention: usize,
    /// Capacity of each consumer group queue.
    pub group_buffer: usize,
    pub overflow: OverflowPolicy,
    pub auto_create_topics: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            partitions: 3,
            retention: 100_000,
            group_buffer: 4096,
            overflow: OverflowPolicy::Drop,
            auto_create_topics: true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Topic / consumer group state
// ═══════════════════════════════════════════════════════════════

struct Topic {
    /// Next offset per partition.
    offsets: Vec<i64>,
    log: VecDeque<Envelope>,
}

impl Topic {
    fn new(partitions: i32) -> Self {
        Self {
            offsets: vec![0; partitions.max(1) as usize],
            log: VecDeque::new(),
        }
    }
}

/// Одна очередь на consumer group: все участники группы читают из неё
/// по очереди, каждое сообщение получает ровно один участник.
struct Group {
    tx: mpsc::Sender<Envelope>,
    rx: GroupReceiver,
    topics: HashSet<String>,
    members: usize,
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, Topic>,
    groups: HashMap<String, Group>,
}

// ═══════════════════════════════════════════════════════════════
//  Broker
// ═══════════════════════════════════════════════════════════════

/// In-process message channel: named topics with key partitioning,
/// bounded retention and consumer groups.
///
/// Publishers and subscribers are created from an `Arc<Broker>` and talk
/// to it only through the `Publisher` / `Subscriber` contracts.
pub struct Broker {
    config: BrokerConfig,
    state: RwLock<BrokerState>,
    open: AtomicBool,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: RwLock::new(BrokerState::default()),
            open: AtomicBool::new(true),
        })
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Publisher with a local send buffer of `send_buffer` envelopes.
    /// Must be called inside a tokio runtime (spawns the delivery worker).
    pub fn publisher(self: &Arc<Self>, send_buffer: usize) -> MemoryPublisher {
        MemoryPublisher::new(self.clone(), send_buffer)
    }

    pub fn subscriber(self: &Arc<Self>, group_id: impl Into<String>, reset: OffsetReset) -> MemorySubscriber {
        MemorySubscriber::new(self.clone(), group_id.into(), reset)
    }

    /// Создать topic, если его ещё нет.
    pub async fn create_topic(&self, name: &str) {
        let mut state = self.state.write().await;
        if !state.topics.contains_key(name) {
            state.topics.insert(name.to_string(), Topic::new(self.config.partitions));
            tracing::info!(topic = %name, partitions = self.config.partitions, "topic created");
        }
    }

    pub async fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().await.topics.keys().cloned().collect();
        names.sort();
        names
    }

    /// Records currently retained for `topic`.
    pub async fn retained(&self, topic: &str) -> usize {
        self.state.read().await.topics.get(topic).map_or(0, |t| t.log.len())
    }

    /// Messages waiting in the group queue (not yet polled by any member).
    pub async fn pending(&self, group_id: &str) -> usize {
        let state = self.state.read().await;
        state
            .groups
            .get(group_id)
            .map_or(0, |g| g.tx.max_capacity() - g.tx.capacity())
    }

    /// Stop accepting traffic. Group queues are dropped, so members drain
    /// what is already queued and then observe `ChannelError::Closed`.
    pub async fn shutdown(&self) {
        self.open.store(false, Ordering::Release);
        let mut state = self.state.write().await;
        state.groups.clear();
        tracing::info!("broker shut down");
    }

    // ── Delivery (publisher worker) ──

    /// Persist into the topic log and fan out to every group subscribed to
    /// the topic. Returns `(partition, offset)`.
    pub(crate) async fn deliver(&self, mut envelope: Envelope) -> Result<(i32, i64), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Unreachable("broker is shut down".into()));
        }

        let mut state = self.state.write().await;

        if !state.topics.contains_key(&envelope.topic) {
            if !self.config.auto_create_topics {
                return Err(ChannelError::UnknownTopic(envelope.topic));
            }
            state
                .topics
                .insert(envelope.topic.clone(), Topic::new(self.config.partitions));
            tracing::info!(topic = %envelope.topic, "topic auto-created");
        }

        let Some(topic) = state.topics.get_mut(&envelope.topic) else {
            return Err(ChannelError::UnknownTopic(envelope.topic));
        };

        let key = (!envelope.key.is_empty()).then_some(envelope.key.as_slice());
        let partition = compute_partition(key, topic.offsets.len() as i32, envelope.partition.unwrap_or(-1));
        let partition = partition.clamp(0, topic.offsets.len() as i32 - 1);
        let offset = topic.offsets[partition as usize];
        topic.offsets[partition as usize] += 1;
        envelope.partition = Some(partition);

        if self.config.retention > 0 {
            if topic.log.len() >= self.config.retention {
                topic.log.pop_front();
            }
            topic.log.push_back(envelope.clone());
        }

        let targets: Vec<(String, mpsc::Sender<Envelope>)> = state
            .groups
            .iter()
            .filter(|(_, g)| g.topics.contains(&envelope.topic))
            .map(|(id, g)| (id.clone(), g.tx.clone()))
            .collect();
        drop(state);

        for (group_id, tx) in targets {
            self.enqueue(&group_id, &tx, envelope.clone()).await;
        }

        Ok((partition, offset))
    }

    /// Called without the state lock held. Under `BackPressure` the publisher
    /// worker waits here for room in the group queue; the message counts as
    /// in flight until the group accepts it.
    async fn enqueue(&self, group_id: &str, tx: &mpsc::Sender<Envelope>, envelope: Envelope) {
        match self.config.overflow {
            OverflowPolicy::Drop => match tx.try_send(envelope) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(env)) => {
                    tracing::warn!(group = %group_id, topic = %env.topic, "group queue full, dropping");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            },
            OverflowPolicy::BackPressure => {
                if tx.send(envelope).await.is_err() {
                    tracing::warn!(group = %group_id, "group queue closed during backpressure send");
                }
            }
        }
    }

    // ── Consumer groups (subscriber) ──

    /// Join `group_id` for `topics`. The group queue is created on first
    /// join; with `Earliest`, retained records of newly added topics are
    /// replayed into it.
    pub(crate) async fn join_group(
        &self,
        group_id: &str,
        topics: &[String],
        reset: OffsetReset,
    ) -> Result<GroupReceiver, ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Unreachable("broker is shut down".into()));
        }

        let mut state = self.state.write().await;

        for topic in topics {
            if !state.topics.contains_key(topic) {
                if !self.config.auto_create_topics {
                    return Err(ChannelError::Subscription {
                        topic: topic.clone(),
                        detail: "topic does not exist".into(),
                    });
                }
                state.topics.insert(topic.clone(), Topic::new(self.config.partitions));
            }
        }

        if !state.groups.contains_key(group_id) {
            let (tx, rx) = mpsc::channel(self.config.group_buffer.max(1));
            state.groups.insert(
                group_id.to_string(),
                Group {
                    tx,
                    rx: Arc::new(Mutex::new(rx)),
                    topics: HashSet::new(),
                    members: 0,
                },
            );
        }

        let BrokerState { topics: topic_map, groups } = &mut *state;
        let Some(group) = groups.get_mut(group_id) else {
            return Err(ChannelError::Subscription {
                topic: topics.join(","),
                detail: format!("group '{group_id}' vanished"),
            });
        };

        for topic in topics {
            if !group.topics.insert(topic.clone()) {
                continue;
            }
            if reset == OffsetReset::Earliest {
                let Some(t) = topic_map.get(topic) else { continue };
                let mut replayed = 0usize;
                for env in &t.log {
                    if group.tx.try_send(env.clone()).is_err() {
                        tracing::warn!(group = %group_id, topic = %topic, replayed, "group queue full during replay");
                        break;
                    }
                    replayed += 1;
                }
                if replayed > 0 {
                    tracing::info!(group = %group_id, topic = %topic, replayed, "replayed retained records");
                }
            }
        }

        group.members += 1;
        tracing::info!(group = %group_id, members = group.members, topics = ?topics, "joined group");
        Ok(group.rx.clone())
    }

    /// The queue outlives its members: unread messages wait for the next one.
    pub(crate) async fn leave_group(&self, group_id: &str) {
        let mut state = self.state.write().await;
        if let Some(group) = state.groups.get_mut(group_id) {
            group.members = group.members.saturating_sub(1);
            tracing::info!(group = %group_id, members = group.members, "left group");
        }
    }
}

use std::collections::BTreeMap;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use channel::BrokerConfig;
use feed::{DEFAULT_TOPIC, ProducerConfig};
use feed_api::{OffsetReset, OverflowPolicy};
use store_file::WriteMode;

use crate::error::SportfeedError;

#[derive(Parser)]
#[command(name = "sportfeed", about = "Football match feed: producer and consumer over a message channel")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Publish a generated match every interval
    Produce(FeedArgs),
    /// Consume matches, log and store them
    Consume(FeedArgs),
    /// Producer and consumer in one process over the in-process channel
    Run(FeedArgs),
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug)]
pub struct FeedArgs {
    /// Путь к config.toml
    #[arg(long, default_value = "config.toml", env = "SPORTFEED_CONFIG")]
    pub config: String,

    /// Event topic (producer and consumer)
    #[arg(long)]
    pub topic: Option<String>,

    /// Интервал между публикациями, мс
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Seed для PRNG (0 = entropy)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Consumer group id
    #[arg(long)]
    pub group_id: Option<String>,

    /// Match store backend
    #[arg(long, value_enum)]
    pub store: Option<StoreKind>,

    /// Directory of the file store
    #[arg(long)]
    pub data_dir: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    None,
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Memory,
    Kafka,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub channel: ChannelSection,
    #[serde(default)]
    pub producer: ProducerSection,
    #[serde(default)]
    pub consumer: ConsumerSection,
    #[serde(default)]
    pub store: StoreSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelSection {
    pub backend: Option<Backend>,
    pub partitions: Option<i32>,
    pub send_buffer: Option<usize>,
    pub group_buffer: Option<usize>,
    pub retention: Option<usize>,
    pub overflow: Option<OverflowPolicy>,
    pub auto_create_topics: Option<bool>,
    /// librdkafka properties, passed through as is.
    #[serde(default)]
    pub kafka: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProducerSection {
    pub topic: Option<String>,
    pub interval_ms: Option<u64>,
    pub flush_timeout_ms: Option<u64>,
    pub seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsumerSection {
    pub topic: Option<String>,
    pub group_id: Option<String>,
    pub auto_offset_reset: Option<OffsetReset>,
    pub poll_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    pub kind: Option<StoreKind>,
    pub table: Option<String>,
    pub data_dir: Option<String>,
    pub max_records: Option<usize>,
    pub write_mode: Option<WriteMode>,
    pub log_matches: Option<bool>,
}

pub fn load_config(path: &str) -> Result<Config, SportfeedError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SportfeedError::config("read", format!("'{path}': {e}")))?;
    parse_config(&content).map_err(|e| match e {
        SportfeedError::Config { context, detail } => SportfeedError::config(context, format!("'{path}': {detail}")),
        other => other,
    })
}

pub fn parse_config(content: &str) -> Result<Config, SportfeedError> {
    toml::from_str(content).map_err(|e| SportfeedError::config("parse", e.to_string()))
}

// ═══════════════════════════════════════════════════════════════
//  Effective — merged config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub kind: StoreKind,
    pub table: String,
    pub data_dir: String,
    pub max_records: usize,
    pub write_mode: WriteMode,
    pub log_matches: bool,
}

/// Итоговая конфигурация после мержа: defaults < config.toml < CLI
#[derive(Debug, Clone)]
pub struct Effective {
    pub backend: Backend,
    pub broker: BrokerConfig,
    pub send_buffer: usize,
    pub kafka: BTreeMap<String, String>,
    pub producer: ProducerConfig,
    pub seed: u64,
    pub consumer_topic: String,
    pub group_id: String,
    pub offset_reset: OffsetReset,
    pub poll_timeout: Duration,
    pub store: StoreSettings,
}

impl Effective {
    pub fn new(args: &FeedArgs) -> Result<Self, SportfeedError> {
        let cfg = match load_config(&args.config) {
            Ok(c) => c,
            Err(e) => {
                if std::path::Path::new(&args.config).exists() {
                    return Err(e);
                }
                tracing::debug!(config = %args.config, "no config file, using defaults");
                Config::default()
            }
        };
        Self::merge(args, cfg)
    }

    pub fn merge(args: &FeedArgs, cfg: Config) -> Result<Self, SportfeedError> {
        let defaults = BrokerConfig::default();
        let broker = BrokerConfig {
            partitions: cfg.channel.partitions.unwrap_or(defaults.partitions),
            retention: cfg.channel.retention.unwrap_or(defaults.retention),
            group_buffer: cfg.channel.group_buffer.unwrap_or(defaults.group_buffer),
            overflow: cfg.channel.overflow.unwrap_or(defaults.overflow),
            auto_create_topics: cfg.channel.auto_create_topics.unwrap_or(defaults.auto_create_topics),
        };

        let producer_topic = args
            .topic
            .clone()
            .or(cfg.producer.topic)
            .unwrap_or_else(|| DEFAULT_TOPIC.into());
        let consumer_topic = args
            .topic
            .clone()
            .or(cfg.consumer.topic)
            .unwrap_or_else(|| DEFAULT_TOPIC.into());

        let eff = Self {
            backend: cfg.channel.backend.unwrap_or_default(),
            broker,
            send_buffer: cfg.channel.send_buffer.unwrap_or(1024),
            kafka: cfg.channel.kafka,
            producer: ProducerConfig {
                topic: producer_topic,
                interval: Duration::from_millis(args.interval_ms.or(cfg.producer.interval_ms).unwrap_or(3000)),
                flush_timeout: Duration::from_millis(cfg.producer.flush_timeout_ms.unwrap_or(15_000)),
            },
            seed: args.seed.or(cfg.producer.seed).unwrap_or(0),
            consumer_topic,
            group_id: args
                .group_id
                .clone()
                .or(cfg.consumer.group_id)
                .unwrap_or_else(|| "sportfeed-group-1".into()),
            offset_reset: cfg.consumer.auto_offset_reset.unwrap_or_default(),
            poll_timeout: Duration::from_millis(cfg.consumer.poll_timeout_ms.unwrap_or(1000)),
            store: StoreSettings {
                kind: args.store.or(cfg.store.kind).unwrap_or_default(),
                table: cfg.store.table.unwrap_or_else(|| "FootballMatches".into()),
                data_dir: args
                    .data_dir
                    .clone()
                    .or(cfg.store.data_dir)
                    .unwrap_or_else(|| "data".into()),
                max_records: cfg.store.max_records.unwrap_or(100_000),
                write_mode: cfg.store.write_mode.unwrap_or_default(),
                log_matches: cfg.store.log_matches.unwrap_or(true),
            },
        };
        eff.validate()?;
        Ok(eff)
    }

    fn validate(&self) -> Result<(), SportfeedError> {
        if self.producer.topic.is_empty() || self.consumer_topic.is_empty() {
            return Err(SportfeedError::config("validate", "topic must not be empty"));
        }
        if self.producer.interval.is_zero() {
            return Err(SportfeedError::config("validate", "interval_ms must be positive"));
        }
        if self.poll_timeout.is_zero() {
            return Err(SportfeedError::config("validate", "poll_timeout_ms must be positive"));
        }
        if self.broker.partitions <= 0 {
            return Err(SportfeedError::config("validate", "partitions must be positive"));
        }
        if self.send_buffer == 0 || self.broker.group_buffer == 0 {
            return Err(SportfeedError::config("validate", "buffers must be positive"));
        }
        if self.group_id.is_empty() {
            return Err(SportfeedError::config("validate", "group_id must not be empty"));
        }
        if self.backend == Backend::Kafka && !self.kafka.contains_key("bootstrap.servers") {
            return Err(SportfeedError::config(
                "validate",
                "[channel.kafka] needs \"bootstrap.servers\"",
            ));
        }
        Ok(())
    }
}

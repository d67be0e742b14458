mod consume;
mod produce;
mod run;

use std::sync::Arc;

use channel::Broker;
use feed::{HandlerChain, LogHandler, StoreHandler};
use feed_api::{MatchHandler, MatchStore, Publisher, Subscriber};
use store_file::{FileMatchStore, FileStoreConfig};
use store_memory::MemoryMatchStore;

use crate::config::{Backend, Effective, StoreKind};
use crate::error::SportfeedError;

#[derive(Debug, Clone, Copy)]
pub enum Mode {
    Produce,
    Consume,
    Run,
}

// ═══════════════════════════════════════════════════════════════
//  Main dispatch
// ═══════════════════════════════════════════════════════════════

pub async fn run(mode: Mode, eff: &Effective) -> Result<(), SportfeedError> {
    let shutdown = feed::signal_token()?;
    match mode {
        Mode::Produce => produce::run(eff, shutdown).await,
        Mode::Consume => consume::run(eff, shutdown).await,
        Mode::Run => run::run(eff, shutdown).await,
    }
}

// ═══════════════════════════════════════════════════════════════
//  Wiring
// ═══════════════════════════════════════════════════════════════

/// In-process broker, only for the memory backend.
fn memory_broker(eff: &Effective) -> Option<Arc<Broker>> {
    match eff.backend {
        Backend::Memory => Some(Broker::new(eff.broker.clone())),
        Backend::Kafka => None,
    }
}

fn build_publisher(eff: &Effective, broker: Option<&Arc<Broker>>) -> Result<Arc<dyn Publisher>, SportfeedError> {
    match (eff.backend, broker) {
        (Backend::Memory, Some(b)) => Ok(Arc::new(b.publisher(eff.send_buffer))),
        (Backend::Kafka, _) => kafka_publisher(eff),
        (Backend::Memory, None) => Err(SportfeedError::config("channel", "memory backend without broker")),
    }
}

fn build_subscriber(eff: &Effective, broker: Option<&Arc<Broker>>) -> Result<Box<dyn Subscriber>, SportfeedError> {
    match (eff.backend, broker) {
        (Backend::Memory, Some(b)) => Ok(Box::new(b.subscriber(eff.group_id.clone(), eff.offset_reset))),
        (Backend::Kafka, _) => kafka_subscriber(eff),
        (Backend::Memory, None) => Err(SportfeedError::config("channel", "memory backend without broker")),
    }
}

#[cfg(feature = "kafka")]
fn kafka_publisher(eff: &Effective) -> Result<Arc<dyn Publisher>, SportfeedError> {
    Ok(Arc::new(channel::kafka::KafkaPublisher::new(&eff.kafka)?))
}

#[cfg(feature = "kafka")]
fn kafka_subscriber(eff: &Effective) -> Result<Box<dyn Subscriber>, SportfeedError> {
    let sub = channel::kafka::KafkaSubscriber::new(&eff.kafka, &eff.group_id, eff.offset_reset)?;
    Ok(Box::new(sub))
}

#[cfg(not(feature = "kafka"))]
fn kafka_publisher(_eff: &Effective) -> Result<Arc<dyn Publisher>, SportfeedError> {
    Err(kafka_disabled())
}

#[cfg(not(feature = "kafka"))]
fn kafka_subscriber(_eff: &Effective) -> Result<Box<dyn Subscriber>, SportfeedError> {
    Err(kafka_disabled())
}

#[cfg(not(feature = "kafka"))]
fn kafka_disabled() -> SportfeedError {
    SportfeedError::config("channel", "backend \"kafka\" requires building with --features kafka")
}

/// Consumer-side handler: optional match logging, then optional store.
/// Returns the store so the caller can flush it on shutdown.
async fn build_handler(
    eff: &Effective,
) -> Result<(Arc<dyn MatchHandler>, Option<Arc<dyn MatchStore>>), SportfeedError> {
    let settings = &eff.store;
    let store: Option<Arc<dyn MatchStore>> = match settings.kind {
        StoreKind::None => None,
        StoreKind::Memory => Some(Arc::new(MemoryMatchStore::new(settings.max_records))),
        StoreKind::File => Some(Arc::new(FileMatchStore::new(&FileStoreConfig {
            data_dir: settings.data_dir.clone(),
            table: settings.table.clone(),
            write_mode: settings.write_mode,
        }))),
    };

    let mut chain = HandlerChain::new();
    if settings.log_matches {
        chain = chain.then(Arc::new(LogHandler));
    }
    if let Some(ref store) = store {
        store.init().await?;
        tracing::info!(kind = ?settings.kind, table = %settings.table, "match store ready");
        chain = chain.then(Arc::new(StoreHandler::new(store.clone(), settings.table.clone())));
    }
    if chain.is_empty() {
        tracing::warn!("no match handlers configured, consumed matches are discarded");
    }
    Ok((Arc::new(chain), store))
}

async fn flush_store(store: Option<Arc<dyn MatchStore>>) {
    if let Some(store) = store {
        if let Err(e) = store.flush().await {
            tracing::error!(error = %e, "store flush failed");
        }
    }
}

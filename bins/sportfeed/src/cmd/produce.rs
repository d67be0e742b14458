use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use feed::{Catalog, ProducerLoop, RecordFactory};

use crate::config::{Backend, Effective};
use crate::error::SportfeedError;

pub async fn run(eff: &Effective, shutdown: CancellationToken) -> Result<(), SportfeedError> {
    let catalog = Arc::new(Catalog::football()?);
    let broker = super::memory_broker(eff);
    if eff.backend == Backend::Memory {
        tracing::warn!("memory backend: published matches stay inside this process, use `run` or the kafka backend");
    }

    let publisher = super::build_publisher(eff, broker.as_ref())?;
    let factory = RecordFactory::seeded(catalog, eff.seed);
    let stats = ProducerLoop::new(publisher, factory, eff.producer.clone(), shutdown)
        .run()
        .await?;

    if let Some(broker) = broker {
        broker.shutdown().await;
    }
    tracing::info!(published = stats.published, delivered = stats.delivered, "producer finished");
    Ok(())
}

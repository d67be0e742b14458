use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use feed::{Catalog, ConsumerLoop, FeedError, ProducerLoop, RecordFactory};

use crate::config::Effective;
use crate::error::SportfeedError;

/// Producer and consumer over one channel, stopped by the same token.
pub async fn run(eff: &Effective, shutdown: CancellationToken) -> Result<(), SportfeedError> {
    let catalog = Arc::new(Catalog::football()?);
    let broker = super::memory_broker(eff);

    let (handler, store) = super::build_handler(eff).await?;
    let subscriber = super::build_subscriber(eff, broker.as_ref())?;
    let publisher = super::build_publisher(eff, broker.as_ref())?;

    let consumer = ConsumerLoop::new(subscriber, shutdown.clone())
        .route(eff.consumer_topic.clone(), handler)
        .poll_timeout(eff.poll_timeout);
    let factory = RecordFactory::seeded(catalog, eff.seed);
    let producer = ProducerLoop::new(publisher, factory, eff.producer.clone(), shutdown.clone());

    let (produced, consumed) = tokio::join!(
        stop_all_on_failure(tokio::spawn(producer.run()), shutdown.clone()),
        stop_all_on_failure(tokio::spawn(consumer.run()), shutdown.clone()),
    );

    super::flush_store(store).await;
    if let Some(broker) = broker {
        broker.shutdown().await;
    }

    let produced = produced??;
    let consumed = consumed??;
    tracing::info!(
        published = produced.published,
        delivered = produced.delivered,
        handled = consumed.handled,
        "run finished"
    );
    Ok(())
}

/// Either loop failing cancels the shared token.
async fn stop_all_on_failure<T>(
    task: JoinHandle<Result<T, FeedError>>,
    shutdown: CancellationToken,
) -> Result<Result<T, FeedError>, JoinError> {
    let res = task.await;
    if !matches!(res, Ok(Ok(_))) {
        shutdown.cancel();
    }
    res
}

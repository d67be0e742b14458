use tokio_util::sync::CancellationToken;

use feed::ConsumerLoop;

use crate::config::Effective;
use crate::error::SportfeedError;

pub async fn run(eff: &Effective, shutdown: CancellationToken) -> Result<(), SportfeedError> {
    let broker = super::memory_broker(eff);
    let subscriber = super::build_subscriber(eff, broker.as_ref())?;
    let (handler, store) = super::build_handler(eff).await?;

    let result = ConsumerLoop::new(subscriber, shutdown)
        .route(eff.consumer_topic.clone(), handler)
        .poll_timeout(eff.poll_timeout)
        .run()
        .await;

    super::flush_store(store).await;
    if let Some(broker) = broker {
        broker.shutdown().await;
    }

    let stats = result?;
    tracing::info!(handled = stats.handled, "consumer finished");
    Ok(())
}

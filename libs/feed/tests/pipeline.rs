use std::sync::Arc;
use std::time::Duration;

use channel::{Broker, BrokerConfig};
use feed::{
    Catalog, ConsumerLoop, HandlerChain, LogHandler, ProducerConfig, ProducerLoop, RecordFactory,
    StoreHandler,
};
use feed_api::{MatchStore, OffsetReset, StoreQuery};
use store_memory::MemoryMatchStore;
use tokio_util::sync::CancellationToken;

const TOPIC: &str = "football-match-new";

#[tokio::test(start_paused = true)]
async fn produced_matches_reach_the_store() {
    let broker = Broker::new(BrokerConfig::default());
    let shutdown = CancellationToken::new();
    let catalog = Arc::new(Catalog::football().unwrap());

    let store = Arc::new(MemoryMatchStore::new(1_000));
    let handler = HandlerChain::new()
        .then(Arc::new(LogHandler))
        .then(Arc::new(StoreHandler::new(store.clone(), "FootballMatches")));

    let consumer = ConsumerLoop::new(
        Box::new(broker.subscriber("sportfeed-group-1", OffsetReset::Earliest)),
        shutdown.clone(),
    )
    .route(TOPIC, Arc::new(handler));
    let consumer = tokio::spawn(consumer.run());

    let producer = ProducerLoop::new(
        Arc::new(broker.publisher(64)),
        RecordFactory::seeded(catalog.clone(), 11),
        ProducerConfig {
            interval: Duration::from_millis(100),
            ..Default::default()
        },
        shutdown.clone(),
    );
    let producer = tokio::spawn(producer.run());

    tokio::time::sleep(Duration::from_millis(1_050)).await;
    shutdown.cancel();

    let produced = producer.await.unwrap().unwrap();
    let consumed = consumer.await.unwrap().unwrap();

    assert_eq!(produced.published, 10);
    assert_eq!(produced.delivered, 10);
    assert!(produced.drained);
    // Shutdown may land between delivery and the next poll.
    assert!(consumed.handled <= produced.delivered);
    assert_eq!(consumed.decode_failed + consumed.handler_failed, 0);

    let stored = store.query(&StoreQuery::default()).await.unwrap();
    assert_eq!(stored.len() as u64, consumed.handled);
    for m in &stored {
        assert_ne!(m.home_team.id, m.away_team.id);
        assert_eq!(catalog.country_of(&m.competition), Some(m.country.as_str()));
    }
}

#[tokio::test(start_paused = true)]
async fn late_group_with_earliest_reset_replays_retained_matches() {
    let broker = Broker::new(BrokerConfig::default());
    let catalog = Arc::new(Catalog::football().unwrap());

    let producer_stop = CancellationToken::new();
    let producer = ProducerLoop::new(
        Arc::new(broker.publisher(64)),
        RecordFactory::seeded(catalog, 5),
        ProducerConfig {
            interval: Duration::from_millis(200),
            ..Default::default()
        },
        producer_stop.clone(),
    );
    let producer = tokio::spawn(producer.run());
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    producer_stop.cancel();
    let produced = producer.await.unwrap().unwrap();
    assert_eq!(produced.delivered, 5);

    let store = Arc::new(MemoryMatchStore::new(100));
    let consumer_stop = CancellationToken::new();
    let consumer = ConsumerLoop::new(
        Box::new(broker.subscriber("late-group", OffsetReset::Earliest)),
        consumer_stop.clone(),
    )
    .route(TOPIC, Arc::new(StoreHandler::new(store.clone(), "FootballMatches")));
    let consumer = tokio::spawn(consumer.run());

    tokio::time::sleep(Duration::from_secs(3)).await;
    consumer_stop.cancel();
    let consumed = consumer.await.unwrap().unwrap();

    assert_eq!(consumed.handled, 5);
    assert_eq!(store.len().await, 5);
}

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;

use tokio::sync::RwLock;
use uuid::Uuid;

use feed_api::{Match, MatchStore, StoreError, StoreQuery};

// ═══════════════════════════════════════════════════════════════
//  MemoryMatchStore
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
struct Inner {
    by_id: HashMap<Uuid, Match>,
    /// Insertion order of ids; upsert of a known id keeps its slot.
    order: VecDeque<Uuid>,
}

/// Bounded in-memory store. При переполнении вытесняется самая старая
/// по времени вставки запись.
pub struct MemoryMatchStore {
    inner: RwLock<Inner>,
    max_records: usize,
}

impl MemoryMatchStore {
    pub fn new(max_records: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_records: max_records.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl MatchStore for MemoryMatchStore {
    fn init(&self) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }

    fn upsert<'a>(
        &'a self,
        record: &'a Match,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            if inner.by_id.insert(record.id, record.clone()).is_none() {
                inner.order.push_back(record.id);
                while inner.order.len() > self.max_records {
                    if let Some(oldest) = inner.order.pop_front() {
                        inner.by_id.remove(&oldest);
                    }
                }
            }
            Ok(())
        })
    }

    fn get(&self, id: Uuid) -> Pin<Box<dyn Future<Output = Result<Option<Match>, StoreError>> + Send + '_>> {
        Box::pin(async move { Ok(self.inner.read().await.by_id.get(&id).cloned()) })
    }

    fn query<'a>(
        &'a self,
        query: &'a StoreQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Match>, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            let mut result: Vec<Match> = inner.by_id.values().filter(|m| query.matches(m)).cloned().collect();
            result.sort_by(|a, b| a.kick_off.cmp(&b.kick_off).then(a.id.cmp(&b.id)));
            if let Some(limit) = query.limit {
                result.truncate(limit);
            }
            Ok(result)
        })
    }

    fn flush(&self) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use feed_api::Team;

    use super::*;

    fn record(home: u32, away: u32, competition: &str, hours: i64) -> Match {
        let home = Team::new(home, format!("Team {home}"), format!("Ground {home}"));
        Match {
            id: Uuid::new_v4(),
            stadium: home.stadium.clone(),
            home_team: home,
            away_team: Team::new(away, format!("Team {away}"), format!("Ground {away}")),
            round: 1,
            competition: competition.into(),
            country: "X".into(),
            kick_off: Utc::now() + Duration::hours(hours),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let store = MemoryMatchStore::new(10);
        let mut m = record(1, 2, "A", 1);
        store.upsert(&m).await.unwrap();
        m.round = 9;
        store.upsert(&m).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(m.id).await.unwrap().unwrap().round, 9);
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oldest_insert_is_evicted() {
        let store = MemoryMatchStore::new(2);
        let first = record(1, 2, "A", 1);
        let second = record(3, 4, "A", 2);
        let third = record(5, 6, "A", 3);
        for m in [&first, &second, &third] {
            store.upsert(m).await.unwrap();
        }

        assert_eq!(store.len().await, 2);
        assert!(store.get(first.id).await.unwrap().is_none());
        assert!(store.get(third.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn query_filters_and_orders_by_kick_off() {
        let store = MemoryMatchStore::new(10);
        let late = record(1, 2, "A", 5);
        let early = record(3, 1, "A", 1);
        let other = record(7, 8, "B", 0);
        for m in [&late, &early, &other] {
            store.upsert(m).await.unwrap();
        }

        let team_one = StoreQuery {
            team_id: Some(1),
            ..Default::default()
        };
        let ids: Vec<_> = store.query(&team_one).await.unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);

        let limited = StoreQuery {
            competition: Some("A".into()),
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(store.query(&limited).await.unwrap()[0].id, early.id);
    }
}

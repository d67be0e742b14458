use std::future::Future;
use std::pin::Pin;

use uuid::Uuid;

use crate::error::{HandlerError, StoreError};
use crate::record::Match;

/// Business logic invoked by the consumer loop for each decoded match.
///
/// The loop calls it at most once per received message and never retries;
/// making the side effect idempotent is up to the implementation.
pub trait MatchHandler: Send + Sync {
    fn handle<'a>(
        &'a self,
        record: &'a Match,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;
}

/// Параметры запроса к хранилищу матчей.
#[derive(Debug, Clone, Default)]
pub struct StoreQuery {
    pub competition: Option<String>,
    /// Matches where this team plays home or away.
    pub team_id: Option<u32>,
    /// Максимальное количество записей (первые N по kick_off).
    pub limit: Option<usize>,
}

impl StoreQuery {
    pub fn matches(&self, m: &Match) -> bool {
        if let Some(ref c) = self.competition {
            if m.competition != *c {
                return false;
            }
        }
        if let Some(team) = self.team_id {
            if m.home_team.id != team && m.away_team.id != team {
                return false;
            }
        }
        true
    }
}

/// Persistence backend for consumed matches, keyed by `Match::id`.
/// `upsert` with an existing id replaces the stored record.
pub trait MatchStore: Send + Sync {
    /// Инициализация (создание директорий и т.д.)
    fn init(&self) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    fn upsert<'a>(
        &'a self,
        record: &'a Match,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

    fn get(&self, id: Uuid) -> Pin<Box<dyn Future<Output = Result<Option<Match>, StoreError>> + Send + '_>>;

    /// Matching records ordered by kick-off.
    fn query<'a>(
        &'a self,
        query: &'a StoreQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Match>, StoreError>> + Send + 'a>>;

    /// Flush буферов (при graceful shutdown).
    fn flush(&self) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;
}

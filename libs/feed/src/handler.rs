use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use feed_api::{HandlerError, Match, MatchHandler, MatchStore};

// ═══════════════════════════════════════════════════════════════
//  LogHandler
// ═══════════════════════════════════════════════════════════════

/// Logs every field of a consumed match.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

impl MatchHandler for LogHandler {
    fn handle<'a>(
        &'a self,
        record: &'a Match,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(
                id = %record.id,
                home_team = %record.home_team.name,
                away_team = %record.away_team.name,
                stadium = %record.stadium,
                round = record.round,
                competition = %record.competition,
                country = %record.country,
                kick_off = %record.kick_off.to_rfc3339(),
                "match received"
            );
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  StoreHandler
// ═══════════════════════════════════════════════════════════════

/// Upserts each match into a [`MatchStore`] under its id.
pub struct StoreHandler {
    store: Arc<dyn MatchStore>,
    table: String,
}

impl StoreHandler {
    pub fn new(store: Arc<dyn MatchStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }
}

impl MatchHandler for StoreHandler {
    fn handle<'a>(
        &'a self,
        record: &'a Match,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(async move {
            self.store.upsert(record).await?;
            tracing::info!(table = %self.table, id = %record.id, "match stored");
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  HandlerChain
// ═══════════════════════════════════════════════════════════════

/// Runs handlers in order, stopping at the first failure.
#[derive(Default)]
pub struct HandlerChain {
    handlers: Vec<Arc<dyn MatchHandler>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, handler: Arc<dyn MatchHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl MatchHandler for HandlerChain {
    fn handle<'a>(
        &'a self,
        record: &'a Match,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(async move {
            for handler in &self.handlers {
                handler.handle(record).await?;
            }
            Ok(())
        })
    }
}

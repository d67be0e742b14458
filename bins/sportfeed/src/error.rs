use feed::{CatalogError, FeedError};
use feed_api::{ChannelError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SportfeedError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Feed(#[from] FeedError),

    #[error("channel: {0}")]
    Channel(#[from] ChannelError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),

    #[error("task: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SportfeedError {
    pub fn config(context: &'static str, detail: impl Into<String>) -> Self {
        SportfeedError::Config {
            context,
            detail: detail.into(),
        }
    }
}

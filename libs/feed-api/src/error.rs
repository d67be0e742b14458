// ════════════════════════════════════════════════════════════════
//  Channel errors
// ════════════════════════════════════════════════════════════════

/// Unified error of the message channel contract (publisher + subscriber).
///
/// `is_fatal()` separates permanent conditions (channel gone, bad config)
/// from transient ones the loops log and skip.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("local send queue is full")]
    QueueFull,

    #[error("{0} is closed")]
    Closed(&'static str),

    #[error("topic '{0}' not found")]
    UnknownTopic(String),

    #[error("channel unreachable: {0}")]
    Unreachable(String),

    #[error("subscription ({topic}): {detail}")]
    Subscription { topic: String, detail: String },

    #[error("transport: {0}")]
    Transport(String),

    #[error("config: {0}")]
    Config(String),
}

impl ChannelError {
    /// Permanent error: retrying the same call cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChannelError::Closed(_) | ChannelError::Unreachable(_) | ChannelError::Config(_)
        )
    }
}

// ════════════════════════════════════════════════════════════════
//  Record / handler / store errors
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidMatch {
    #[error("home and away team are the same (id {0})")]
    SameTeam(u32),

    #[error("stadium '{stadium}' is not the home stadium '{home}'")]
    Stadium { stadium: String, home: String },

    #[error("round must be positive, got {0}")]
    Round(u32),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(String),

    #[error("format: {0}")]
    Format(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("rejected: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(ChannelError::Closed("subscriber").is_fatal());
        assert!(ChannelError::Unreachable("broker down".into()).is_fatal());
        assert!(!ChannelError::QueueFull.is_fatal());
        assert!(!ChannelError::Transport("timeout".into()).is_fatal());
        assert!(!ChannelError::UnknownTopic("x".into()).is_fatal());
    }

    #[test]
    fn store_error_converts_into_handler_error() {
        let e: HandlerError = StoreError::Io("disk full".into()).into();
        assert_eq!(e.to_string(), "store: io: disk full");
    }
}

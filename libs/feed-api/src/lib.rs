pub mod channel;
pub mod error;
pub mod handler;
pub mod record;

pub use channel::{
    DeliveryReport, DeliveryReportStream, Envelope, OffsetReset, OverflowPolicy, PollOutcome,
    Publisher, Subscriber,
};
pub use error::{ChannelError, HandlerError, InvalidMatch, StoreError};
pub use handler::{MatchHandler, MatchStore, StoreQuery};
pub use record::{Match, Team};

/// Текущее Unix-время в миллисекундах.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

use feed_api::ChannelError;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("subscribe failed: {0}")]
    Subscription(ChannelError),

    #[error("channel lost: {0}")]
    ChannelLost(ChannelError),

    #[error("delivery report stream already taken")]
    ReportsTaken,

    #[error("consumer has no routed topics")]
    NoRoutes,
}

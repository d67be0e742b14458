//! Match feed core: record generation, wire codec and the producer /
//! consumer loops that move matches through a message channel.

pub mod catalog;
pub mod codec;
pub mod consumer;
pub mod error;
pub mod factory;
pub mod handler;
pub mod producer;
pub mod shutdown;

pub use catalog::{Catalog, CatalogError, League};
pub use codec::{CodecError, JsonCodec};
pub use consumer::{ConsumerLoop, ConsumerState, ConsumerStats};
pub use error::FeedError;
pub use factory::RecordFactory;
pub use handler::{HandlerChain, LogHandler, StoreHandler};
pub use producer::{DEFAULT_TOPIC, ProducerConfig, ProducerLoop, ProducerState, ProducerStats};
pub use shutdown::signal_token;

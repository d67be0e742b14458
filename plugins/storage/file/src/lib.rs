//! JSONL match store: one `{data_dir}/{table}.jsonl` file per table.

mod config;
mod storage;

pub use config::{FileStoreConfig, WriteMode};
pub use storage::FileMatchStore;

pub mod collector;
pub mod config;
pub mod model_download;
pub mod operator;
pub mod pipeline;
pub mod session;
pub mod storage;
pub mod types;

pub use collector::{CollectionReport, DatasetCollector, LabelReport};
pub use config::CollectorConfig;

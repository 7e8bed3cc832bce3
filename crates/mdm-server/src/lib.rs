//! Runtime wiring for the MDM server binary: configuration, the reference
//! weighted-field classifier and a notification sink that writes link events
//! to the log.

pub mod classifier;
pub mod config;
pub mod sink;

pub use classifier::{MatchingConfig, WeightedFieldClassifier};
pub use config::ServerConfig;
pub use sink::TracingSink;

//! Core miner logic: configuration, errors and the stage pipeline

pub mod config;
pub mod error;
pub mod pipeline;

pub use config::MinerConfig;
pub use error::{MinerError, MinerResult, Stage};
pub use pipeline::{MineReport, MiningPass, PassSummary, TraceMiner};

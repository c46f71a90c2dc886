#![deny(unreachable_pub)]
pub mod config;
pub mod ladder;
pub mod runner;

pub use config::{ConfigError, Settings};
pub use ladder::{LadderEngine, LadderError, LadderResult};
pub use runner::{drive, LadderRunner, RunnerOptions};

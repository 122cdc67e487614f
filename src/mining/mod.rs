//! Mining module - account sessions and the scheduler that runs them
//!
//! - `AccountMiner` owns one account's session state machine and timers
//! - `Scheduler` binds identities to egress paths and runs one miner per account

pub mod config;
pub mod scheduler;
pub mod session;

pub use config::MinerConfig;
pub use scheduler::{RunningScheduler, Scheduler};
pub use session::AccountMiner;

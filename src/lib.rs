// Exnus session miner library
pub mod classify;
pub mod client;
pub mod common;
pub mod egress;
pub mod error;
pub mod identity;
pub mod mining;
pub mod progress;
pub mod sink;
pub mod types;

// Re-export for convenience
pub use classify::{ApiFailure, ErrorMatchSet, FailureKind};
pub use client::{RemoteSessionClient, SessionApi};
pub use egress::{EgressDescriptor, EgressKind};
pub use error::{EgressError, IdentityError, MinerError, MinerResult};
pub use identity::{AccountBinding, AccountIdentity};
pub use mining::{AccountMiner, MinerConfig, RunningScheduler, Scheduler};
pub use sink::{ChannelSink, LogBuffer, LogEntry, ObservabilitySink, SinkEvent, TracingSink};
pub use types::{AccountStatus, SessionSnapshot, SessionStatus};

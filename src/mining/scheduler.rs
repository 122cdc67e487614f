//! Scheduler - binds identities to egress paths and runs one session per account

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::client::{RemoteSessionClient, SessionApi};
use crate::egress::{EgressDescriptor, assign_round_robin};
use crate::error::MinerError;
use crate::identity::{AccountBinding, AccountIdentity};
use crate::mining::config::MinerConfig;
use crate::mining::session::AccountMiner;
use crate::sink::{LogEntry, ObservabilitySink};
use crate::types::SessionSnapshot;

/// Account bindings ready to be started
#[derive(Debug)]
pub struct Scheduler {
    bindings: Vec<AccountBinding>,
    config: Arc<MinerConfig>,
}

impl Scheduler {
    /// Bind identity `i` to `descriptors[i % len]`, or to direct egress when
    /// there are no descriptors.
    pub fn new(
        identities: Vec<AccountIdentity>,
        descriptors: &[EgressDescriptor],
        config: MinerConfig,
    ) -> Result<Self, MinerError> {
        if identities.is_empty() {
            return Err(MinerError::NothingToRun);
        }

        let bindings = identities
            .into_iter()
            .enumerate()
            .map(|(index, identity)| {
                AccountBinding::new(identity, assign_round_robin(index, descriptors))
            })
            .collect();

        Ok(Self {
            bindings,
            config: Arc::new(config),
        })
    }

    pub fn bindings(&self) -> &[AccountBinding] {
        &self.bindings
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// Start every account with its own HTTP client
    pub fn start(
        self,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Result<RunningScheduler<RemoteSessionClient>, MinerError> {
        self.start_with(sink, |binding, config| {
            RemoteSessionClient::new(binding.egress.as_ref(), config.clone())
        })
    }

    /// Start every account with a client from `make_api`.
    ///
    /// An account whose client cannot be built is reported and skipped; the
    /// others still start. Fails only when no account could start.
    pub fn start_with<A, F>(
        self,
        sink: Arc<dyn ObservabilitySink>,
        mut make_api: F,
    ) -> Result<RunningScheduler<A>, MinerError>
    where
        A: SessionApi,
        F: FnMut(&AccountBinding, &Arc<MinerConfig>) -> Result<A, MinerError>,
    {
        let mut miners = Vec::with_capacity(self.bindings.len());
        let mut skipped = Vec::new();
        let mut first_error = None;

        for binding in self.bindings {
            match make_api(&binding, &self.config) {
                Ok(api) => miners.push(Arc::new(AccountMiner::new(
                    binding,
                    api,
                    self.config.clone(),
                    sink.clone(),
                ))),
                Err(e) => {
                    let entry = LogEntry::new(
                        binding.id(),
                        format!("Failed to create HTTP client: {}", e),
                    );
                    tracing::error!(account = entry.account_id, "{}", entry.text);
                    sink.log(&entry);
                    skipped.push(binding.id());
                    first_error.get_or_insert(e);
                }
            }
        }

        if miners.is_empty() {
            return Err(first_error.unwrap_or(MinerError::NothingToRun));
        }

        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        for miner in &miners {
            tasks.spawn(miner.clone().run(cancel.child_token()));
        }
        tracing::info!(
            accounts = miners.len(),
            skipped = skipped.len(),
            "account sessions started"
        );

        Ok(RunningScheduler {
            miners,
            skipped,
            tasks,
            cancel,
            grace: self.config.shutdown_grace,
        })
    }
}

/// Handle to the running account sessions
pub struct RunningScheduler<A> {
    miners: Vec<Arc<AccountMiner<A>>>,
    skipped: Vec<usize>,
    tasks: JoinSet<()>,
    cancel: CancellationToken,
    grace: Duration,
}

impl<A: SessionApi> RunningScheduler<A> {
    pub fn len(&self) -> usize {
        self.miners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.miners.is_empty()
    }

    pub fn miners(&self) -> &[Arc<AccountMiner<A>>] {
        &self.miners
    }

    /// Ids of accounts that never started because their client failed
    pub fn skipped(&self) -> &[usize] {
        &self.skipped
    }

    /// Current state of every account, ordered by account id
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.miners.iter().map(|m| m.snapshot()).collect()
    }

    /// Cancel every session and wait for them to finish.
    ///
    /// Tasks still running after the grace period are aborted. Clients are
    /// released before this returns.
    pub async fn stop(mut self) {
        self.cancel.cancel();

        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(self.grace, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    if e.is_panic() {
                        tracing::error!("account task panicked: {}", e);
                    }
                }
            }
        })
        .await
        .is_ok();

        if !drained {
            tracing::warn!(
                grace = ?self.grace,
                "account sessions did not stop in time, aborting"
            );
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
        }

        self.miners.clear();
        tracing::info!("account sessions stopped");
    }
}

//! Account session state machine
//!
//! One [`AccountMiner`] per account. It owns the session state and drives two
//! timers side by side: a renewal countdown that re-activates the moment a
//! window closes, and a slower status refresh that keeps points and rank
//! current and pulls failed sessions back out of `Error`.
//!
//! Every mutation goes through [`AccountMiner::transition`], which holds the
//! session lock for the duration of the change and the snapshot it emits, so
//! observers see one account's updates in order.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::classify::{ApiFailure, FailureKind};
use crate::client::SessionApi;
use crate::identity::AccountBinding;
use crate::mining::config::MinerConfig;
use crate::sink::{LogBuffer, LogEntry, ObservabilitySink};
use crate::types::{AccountSession, SessionSnapshot, SessionStatus};

/// Shortest period either timer will run at
const MIN_TIMER_PERIOD: Duration = Duration::from_millis(100);

struct SessionCell {
    session: AccountSession,
    logs: LogBuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Failures that need someone to fix the account are errors; the rest
    /// heal on the next scheduled trigger.
    fn of(kind: FailureKind) -> Self {
        if kind.is_persistent() {
            Severity::Error
        } else {
            Severity::Warn
        }
    }
}

/// Lifecycle manager for one account
pub struct AccountMiner<A> {
    binding: AccountBinding,
    api: A,
    config: Arc<MinerConfig>,
    sink: Arc<dyn ObservabilitySink>,
    cell: Mutex<SessionCell>,
}

impl<A: SessionApi> AccountMiner<A> {
    pub fn new(
        binding: AccountBinding,
        api: A,
        config: Arc<MinerConfig>,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Self {
        let logs = LogBuffer::with_capacity(config.log_capacity);
        Self {
            binding,
            api,
            config,
            sink,
            cell: Mutex::new(SessionCell {
                session: AccountSession::default(),
                logs,
            }),
        }
    }

    pub fn id(&self) -> usize {
        self.binding.id()
    }

    pub fn binding(&self) -> &AccountBinding {
        &self.binding
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn status(&self) -> SessionStatus {
        self.cell.lock().session.status()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let cell = self.cell.lock();
        self.snapshot_of(&cell.session)
    }

    /// Retained log lines, oldest first
    pub fn logs(&self) -> Vec<LogEntry> {
        self.cell.lock().logs.entries()
    }

    /// Run until `cancel` fires. In-flight calls are dropped on cancellation.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = self.lifecycle() => {}
        }
        self.log(Severity::Warn, "Miner stopped");
    }

    async fn lifecycle(&self) {
        self.log(Severity::Info, "Starting miner initialization");
        self.fetch_ip().await;

        if self.refresh_status().await {
            if self.status() == SessionStatus::Active {
                self.log(Severity::Info, "Mining is already active");
            } else {
                self.activate().await;
            }
        }
        self.log(Severity::Info, "Miner initialization completed");

        tokio::join!(self.renewal_timer(), self.refresh_timer());
    }

    // =========================================================================
    // TIMERS
    // =========================================================================

    async fn renewal_timer(&self) {
        let mut ticker = tokio::time::interval(self.config.countdown_interval.max(MIN_TIMER_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if self.tick() {
                self.log(
                    Severity::Info,
                    "Mining period completed, attempting to start mining again",
                );
                self.activate().await;
            }
        }
    }

    async fn refresh_timer(&self) {
        let period = self.config.refresh_interval.max(MIN_TIMER_PERIOD);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.refresh_cycle().await;
        }
    }

    /// One countdown step. Returns true when the window has just closed.
    fn tick(&self) -> bool {
        let mut cell = self.cell.lock();
        let expired = cell.session.expire_if_due();
        if expired || cell.session.status() == SessionStatus::Active {
            self.sink.snapshot(&self.snapshot_of(&cell.session));
        }
        expired
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    /// Refresh status and, if that worked and no window is open, activate.
    pub(crate) async fn refresh_cycle(&self) {
        if self.refresh_status().await && self.status() != SessionStatus::Active {
            self.activate().await;
        }
    }

    async fn fetch_ip(&self) {
        if self.binding.egress.is_none() {
            self.log(Severity::Warn, "No proxy configured");
        }
        match self.api.fetch_public_ip().await {
            Ok(ip) => self.transition(|s| s.set_observed_ip(ip)),
            Err(failure) => {
                self.transition(|s| s.set_observed_ip("Unknown"));
                self.log(Severity::Warn, format!("Failed to fetch IP: {}", failure));
            }
        }
    }

    /// Fetch account status. Returns whether the fetch succeeded.
    async fn refresh_status(&self) -> bool {
        match self.api.fetch_account_status(self.binding.address()).await {
            Ok(remote) => {
                self.transition(|s| s.adopt_refresh(&remote));
                self.log(Severity::Info, "User info fetched successfully");
                true
            }
            Err(failure) => {
                self.transition(|s| s.record_refresh_failure(&failure));
                self.report_failure("Failed to fetch user info", &failure);
                false
            }
        }
    }

    /// Sign and submit an activation, unless one is in flight or a window is
    /// still open.
    pub(crate) async fn activate(&self) {
        if !self.transition(AccountSession::begin_activation) {
            return;
        }
        self.log(Severity::Info, "Mining is not active, attempting to start");

        let signature = self
            .binding
            .identity
            .sign_base58(self.config.activation_message.as_bytes());

        match self
            .api
            .submit_activation(self.binding.address(), &signature)
            .await
        {
            Ok(remote) => match self.transition(|s| s.adopt(&remote)) {
                SessionStatus::Active => {
                    self.log(Severity::Info, "Mining activated successfully");
                }
                _ => self.log(
                    Severity::Warn,
                    "Activation accepted but no open mining window was returned",
                ),
            },
            Err(failure) if failure.kind == FailureKind::AlreadyActive => {
                self.log(Severity::Warn, "Mining session already active");
                self.reconcile().await;
            }
            Err(failure) => {
                self.transition(|s| s.fail(failure.to_string()));
                self.report_failure("Failed to start mining", &failure);
            }
        }
    }

    /// Adopt the server's view after it reported an already-open session.
    /// Exactly one fetch, and never a second activation.
    async fn reconcile(&self) {
        match self.api.fetch_account_status(self.binding.address()).await {
            Ok(remote) => {
                self.transition(|s| s.adopt(&remote));
                self.log(Severity::Info, "User info fetched successfully");
            }
            Err(failure) => {
                self.transition(|s| s.settle_idle(Some(failure.to_string())));
                self.log(
                    Severity::Warn,
                    format!("Could not confirm the active session: {}", failure),
                );
            }
        }
    }

    fn report_failure(&self, context: &str, failure: &ApiFailure) {
        let severity = Severity::of(failure.kind);
        match failure.kind {
            FailureKind::AlreadyActive => self.log(severity, "Mining session already active"),
            FailureKind::NetworkError => self.log(
                severity,
                format!("{}: {} (will retry on next refresh)", context, failure),
            ),
            FailureKind::Unknown => self.log(
                severity,
                format!("{}: unclassified server response: {}", context, failure),
            ),
            FailureKind::Unauthorized | FailureKind::SignatureRejected => {
                self.log(severity, format!("{}: {}", context, failure));
                let detail = if failure.kind == FailureKind::Unauthorized {
                    "Unauthorized access (401)"
                } else {
                    "Signature validation failed on server"
                };
                self.log(severity, detail);
            }
        }
    }

    // =========================================================================
    // STATE ACCESS
    // =========================================================================

    fn transition<R>(&self, change: impl FnOnce(&mut AccountSession) -> R) -> R {
        let mut cell = self.cell.lock();
        let result = change(&mut cell.session);
        self.sink.snapshot(&self.snapshot_of(&cell.session));
        result
    }

    fn log(&self, severity: Severity, text: impl Into<String>) {
        let entry = LogEntry::new(self.id(), text);
        match severity {
            Severity::Info => tracing::info!(account = entry.account_id, "{}", entry.text),
            Severity::Warn => tracing::warn!(account = entry.account_id, "{}", entry.text),
            Severity::Error => tracing::error!(account = entry.account_id, "{}", entry.text),
        }

        let mut cell = self.cell.lock();
        self.sink.log(&entry);
        cell.logs.push(entry);
    }

    fn snapshot_of(&self, session: &AccountSession) -> SessionSnapshot {
        session.snapshot(
            self.binding.id(),
            self.binding.address(),
            self.binding.egress.as_ref().map(|e| e.redacted()),
        )
    }
}

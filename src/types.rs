use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::time::Instant;

use crate::classify::{ApiFailure, FailureKind};
use crate::common::format_countdown;

/// Lifecycle status of one account's mining session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionStatus {
    Idle,
    Activating,
    Active,
    Error,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Idle => "Idle",
            SessionStatus::Activating => "Activating",
            SessionStatus::Active => "Mining Active",
            SessionStatus::Error => "Error",
        };
        f.write_str(label)
    }
}

/// Account status as reported by the reward service.
///
/// The service is loose about numeric types, so counts accept floats and
/// nulls and the end time accepts either integer or float milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatus {
    #[serde(default, deserialize_with = "lenient_count")]
    pub points: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub rank: u64,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub mining_end_time: Option<i64>,
}

fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = Option::<serde_json::Number>::deserialize(deserializer)?;
    Ok(value
        .and_then(|n| n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)))
        .unwrap_or(0))
}

fn lenient_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let value = Option::<serde_json::Number>::deserialize(deserializer)?;
    Ok(value.and_then(|n| n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))))
}

/// End of an activation window, pinned both to wall-clock time (for display)
/// and to the runtime clock (for the countdown).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub at: DateTime<Utc>,
    instant: Instant,
}

impl Deadline {
    /// Build a deadline from a server end time in epoch milliseconds.
    /// Returns `None` when the end time is not in the future.
    pub fn from_epoch_millis(end_ms: i64) -> Option<Self> {
        let remaining = end_ms.checked_sub(Utc::now().timestamp_millis())?;
        if remaining <= 0 {
            return None;
        }
        let at = DateTime::from_timestamp_millis(end_ms)?;
        Some(Self {
            at,
            instant: Instant::now() + Duration::from_millis(remaining as u64),
        })
    }

    pub fn remaining(&self) -> Duration {
        self.instant.saturating_duration_since(Instant::now())
    }

    pub fn is_elapsed(&self) -> bool {
        Instant::now() >= self.instant
    }
}

/// Mutable runtime state of one account.
///
/// `deadline` is set exactly when `status` is `Active`; every mutator below
/// keeps that pairing intact.
#[derive(Debug, Clone)]
pub struct AccountSession {
    status: SessionStatus,
    points: u64,
    rank: u64,
    deadline: Option<Deadline>,
    observed_ip: String,
    last_error: Option<String>,
}

impl Default for AccountSession {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            points: 0,
            rank: 0,
            deadline: None,
            observed_ip: "N/A".to_string(),
            last_error: None,
        }
    }
}

impl AccountSession {
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn points(&self) -> u64 {
        self.points
    }

    pub fn rank(&self) -> u64 {
        self.rank
    }

    pub fn deadline(&self) -> Option<&Deadline> {
        self.deadline.as_ref()
    }

    pub fn observed_ip(&self) -> &str {
        &self.observed_ip
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn set_observed_ip(&mut self, ip: impl Into<String>) {
        self.observed_ip = ip.into();
    }

    /// Adopt the result of an activation or reconciliation: always resolves
    /// to `Active` or `Idle`.
    pub(crate) fn adopt(&mut self, remote: &AccountStatus) -> SessionStatus {
        self.adopt_inner(remote, false)
    }

    /// Adopt the result of a periodic refresh. An activation that is already
    /// in flight keeps `Activating` unless the server reports a live window.
    pub(crate) fn adopt_refresh(&mut self, remote: &AccountStatus) -> SessionStatus {
        self.adopt_inner(remote, true)
    }

    fn adopt_inner(&mut self, remote: &AccountStatus, keep_activating: bool) -> SessionStatus {
        self.points = remote.points;
        self.rank = remote.rank;
        self.last_error = None;

        match remote.mining_end_time.and_then(Deadline::from_epoch_millis) {
            Some(deadline) => {
                self.status = SessionStatus::Active;
                self.deadline = Some(deadline);
            }
            None if keep_activating && self.status == SessionStatus::Activating => {
                self.deadline = None;
            }
            None => {
                self.status = SessionStatus::Idle;
                self.deadline = None;
            }
        }
        self.status
    }

    /// Claim the right to submit an activation. Fails when one is already
    /// in flight or the current window is still open.
    pub(crate) fn begin_activation(&mut self) -> bool {
        match self.status {
            SessionStatus::Activating => false,
            SessionStatus::Active if self.deadline.is_some_and(|d| !d.is_elapsed()) => false,
            _ => {
                self.status = SessionStatus::Activating;
                self.deadline = None;
                true
            }
        }
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.status = SessionStatus::Error;
        self.deadline = None;
        self.last_error = Some(message.into());
    }

    pub(crate) fn settle_idle(&mut self, message: Option<String>) {
        self.status = SessionStatus::Idle;
        self.deadline = None;
        self.last_error = message;
    }

    /// Apply a failed status fetch. Auth failures always surface as `Error`;
    /// other failures leave a live window (or an in-flight activation) alone.
    pub(crate) fn record_refresh_failure(&mut self, failure: &ApiFailure) -> SessionStatus {
        let message = failure.to_string();
        match (failure.kind, self.status) {
            (FailureKind::Unauthorized, _) => self.fail(message),
            (_, SessionStatus::Active | SessionStatus::Activating) => {
                self.last_error = Some(message);
            }
            _ => self.fail(message),
        }
        self.status
    }

    /// Move an expired `Active` session back to `Idle`. Returns true exactly
    /// once per window.
    pub(crate) fn expire_if_due(&mut self) -> bool {
        let due = self.status == SessionStatus::Active
            && self.deadline.as_ref().is_none_or(Deadline::is_elapsed);
        if due {
            self.settle_idle(None);
        }
        due
    }

    pub(crate) fn snapshot(
        &self,
        account_id: usize,
        address: &str,
        egress: Option<String>,
    ) -> SessionSnapshot {
        SessionSnapshot {
            account_id,
            address: address.to_string(),
            egress,
            status: self.status,
            points: self.points,
            rank: self.rank,
            activation_deadline: self.deadline.map(|d| d.at),
            remaining: self.deadline.map(|d| d.remaining()),
            observed_ip: self.observed_ip.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Immutable copy of an account session handed to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub account_id: usize,
    pub address: String,
    pub egress: Option<String>,
    pub status: SessionStatus,
    pub points: u64,
    pub rank: u64,
    pub activation_deadline: Option<DateTime<Utc>>,
    pub remaining: Option<Duration>,
    pub observed_ip: String,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    /// Time left in the current window, or `-` when not mining
    pub fn countdown(&self) -> String {
        match self.remaining {
            Some(remaining) if self.status == SessionStatus::Active => format_countdown(remaining),
            _ => "-".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_ending_in(ms: i64) -> AccountStatus {
        AccountStatus {
            points: 42,
            rank: 7,
            mining_end_time: Some(Utc::now().timestamp_millis() + ms),
        }
    }

    #[test]
    fn test_account_status_lenient_numbers() {
        let status: AccountStatus =
            serde_json::from_str(r#"{"points": 12.7, "rank": null, "miningEndTime": 1700000000000.0}"#)
                .unwrap();
        assert_eq!(status.points, 12);
        assert_eq!(status.rank, 0);
        assert_eq!(status.mining_end_time, Some(1_700_000_000_000));

        let empty: AccountStatus = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, AccountStatus::default());
    }

    #[test]
    fn test_deadline_rejects_past_end_time() {
        assert!(Deadline::from_epoch_millis(Utc::now().timestamp_millis() - 1).is_none());
        assert!(Deadline::from_epoch_millis(Utc::now().timestamp_millis() + 60_000).is_some());
    }

    #[tokio::test]
    async fn test_adopt_future_window_is_active() {
        let mut session = AccountSession::default();
        assert_eq!(session.adopt(&status_ending_in(60_000)), SessionStatus::Active);
        assert!(session.deadline().is_some());
        assert_eq!(session.points(), 42);
        assert_eq!(session.rank(), 7);
    }

    #[tokio::test]
    async fn test_adopt_past_window_is_idle() {
        let mut session = AccountSession::default();
        assert_eq!(session.adopt(&status_ending_in(-5_000)), SessionStatus::Idle);
        assert!(session.deadline().is_none());
    }

    #[tokio::test]
    async fn test_refresh_keeps_inflight_activation() {
        let mut session = AccountSession::default();
        assert!(session.begin_activation());
        assert!(!session.begin_activation());

        let status = session.adopt_refresh(&AccountStatus::default());
        assert_eq!(status, SessionStatus::Activating);
        assert!(session.deadline().is_none());
    }

    #[tokio::test]
    async fn test_begin_activation_refused_while_window_open() {
        let mut session = AccountSession::default();
        session.adopt(&status_ending_in(60_000));
        assert!(!session.begin_activation());
        assert_eq!(session.status(), SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_refresh_failure_policy() {
        let transient = ApiFailure::new(FailureKind::NetworkError, None, "timed out");
        let auth = ApiFailure::new(FailureKind::Unauthorized, Some(401), "Unauthorized");

        let mut active = AccountSession::default();
        active.adopt(&status_ending_in(60_000));
        assert_eq!(active.record_refresh_failure(&transient), SessionStatus::Active);
        assert!(active.deadline().is_some());
        assert!(active.last_error().is_some());
        assert_eq!(active.record_refresh_failure(&auth), SessionStatus::Error);
        assert!(active.deadline().is_none());

        let mut idle = AccountSession::default();
        assert_eq!(idle.record_refresh_failure(&transient), SessionStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_fires_once_per_window() {
        let mut session = AccountSession::default();
        session.adopt(&status_ending_in(1_500));
        assert!(!session.expire_if_due());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(session.expire_if_due());
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.deadline().is_none());
        assert!(!session.expire_if_due());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_countdown_never_negative() {
        let mut session = AccountSession::default();
        session.adopt(&status_ending_in(1_000));
        tokio::time::advance(Duration::from_secs(5)).await;

        let snapshot = session.snapshot(1, "addr", None);
        assert_eq!(snapshot.remaining, Some(Duration::ZERO));
        assert_eq!(snapshot.countdown(), "0h 0m 0s");
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(SessionStatus::Active.to_string(), "Mining Active");
        assert_eq!(SessionStatus::Idle.to_string(), "Idle");
        assert_eq!(SessionStatus::Error.to_string(), "Error");
    }
}

//! Console reporter: prints account log lines above a live status line

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::common::format_countdown;
use crate::sink::{LogEntry, SinkEvent};
use crate::types::{SessionSnapshot, SessionStatus};

/// Progress display manager
pub struct ProgressDisplay {
    bar: ProgressBar,
    accounts: usize,
    snapshots: BTreeMap<usize, SessionSnapshot>,
}

impl ProgressDisplay {
    pub fn new(accounts: usize) -> Self {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));

        let display = Self {
            bar,
            accounts,
            snapshots: BTreeMap::new(),
        };
        display.bar.set_message(display.summary());
        display
    }

    pub fn handle(&mut self, event: SinkEvent) {
        match event {
            SinkEvent::Log(entry) => self.bar.println(format_log_line(&entry)),
            SinkEvent::Snapshot(snapshot) => {
                self.snapshots.insert(snapshot.account_id, snapshot);
                self.bar.set_message(self.summary());
            }
        }
    }

    /// Latest known state per account
    pub fn snapshots(&self) -> impl Iterator<Item = &SessionSnapshot> {
        self.snapshots.values()
    }

    pub fn summary(&self) -> String {
        summarize(self.accounts, self.snapshots.values())
    }

    pub fn finish_with_message(&self, msg: &str) {
        self.bar.finish_with_message(msg.to_string());
    }
}

/// `[HH:MM:SS] [Account N] text`
pub fn format_log_line(entry: &LogEntry) -> String {
    format!(
        "{} {} {}",
        style(entry.timestamp.format("[%H:%M:%S]")).dim(),
        style(format!("[Account {}]", entry.account_id)).cyan(),
        entry.text
    )
}

fn summarize<'a>(accounts: usize, snapshots: impl Iterator<Item = &'a SessionSnapshot>) -> String {
    let mut counts = [0usize; 4];
    let mut soonest: Option<Duration> = None;

    for snapshot in snapshots {
        let slot = match snapshot.status {
            SessionStatus::Active => 0,
            SessionStatus::Activating => 1,
            SessionStatus::Idle => 2,
            SessionStatus::Error => 3,
        };
        counts[slot] += 1;

        if snapshot.status == SessionStatus::Active {
            if let Some(remaining) = snapshot.remaining {
                soonest = Some(soonest.map_or(remaining, |s| s.min(remaining)));
            }
        }
    }

    let next = soonest
        .map(format_countdown)
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{} accounts | {} mining | {} activating | {} idle | {} error | next renewal {}",
        accounts, counts[0], counts[1], counts[2], counts[3], next
    )
}

/// Drain sink events into the display until every sender is gone
pub async fn report(
    mut events: UnboundedReceiver<SinkEvent>,
    mut display: ProgressDisplay,
) -> ProgressDisplay {
    while let Some(event) = events.recv().await {
        display.handle(event);
    }
    display
}

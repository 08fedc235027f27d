//! Fetch-on-reconnect cycle: scan every purpose, process every hit.

use std::sync::Arc;

use agora_types::PointerPurpose;
use tokio::sync::watch;

use crate::directory::PointerDirectory;
use crate::mailbox::{MessageMailbox, ProcessOutcome};
use crate::schedule::{run_cycles, CycleStatus, Schedule};

/// Tally of one mailbox cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollReport {
    pub delivered: usize,
    pub already_processed: usize,
    pub in_flight: usize,
    pub unhandled: usize,
    pub transient_failures: usize,
    pub failures: usize,
}

impl PollReport {
    fn record(&mut self, outcome: ProcessOutcome) {
        match outcome {
            ProcessOutcome::Delivered => self.delivered += 1,
            ProcessOutcome::AlreadyProcessed => self.already_processed += 1,
            ProcessOutcome::InFlight => self.in_flight += 1,
            ProcessOutcome::Unhandled => self.unhandled += 1,
        }
    }

    pub fn status(&self) -> CycleStatus {
        if self.failures > 0 {
            CycleStatus::Failed
        } else if self.transient_failures > 0 && self.delivered == 0 {
            CycleStatus::TransientFailure
        } else {
            CycleStatus::Healthy
        }
    }
}

/// Runs one lookup per purpose and processes every pointer found.
///
/// Failures are counted and logged; one bad pointer never stops the
/// rest of the cycle.
pub async fn poll_once(directory: &PointerDirectory, mailbox: &MessageMailbox) -> PollReport {
    let mut report = PollReport::default();

    for purpose in PointerPurpose::ALL {
        let scan = match directory.lookup(purpose).await {
            Ok(scan) => scan,
            Err(e) => {
                tracing::warn!(%purpose, error = %e, "mailbox lookup failed");
                if e.is_transient() {
                    report.transient_failures += 1;
                } else {
                    report.failures += 1;
                }
                continue;
            }
        };

        for pointer in scan {
            match mailbox.process(&pointer).await {
                Ok(outcome) => report.record(outcome),
                Err(e) if e.is_transient() => report.transient_failures += 1,
                Err(e) => {
                    tracing::debug!(pointer_id = %pointer.pointer_id, error = %e, "pointer processing failed");
                    report.failures += 1;
                }
            }
        }
    }

    if report.delivered > 0 || report.failures > 0 || report.transient_failures > 0 {
        tracing::info!(
            delivered = report.delivered,
            already_processed = report.already_processed,
            failures = report.failures,
            transient_failures = report.transient_failures,
            "mailbox cycle finished"
        );
    }
    report
}

pub async fn run_poller(
    directory: Arc<PointerDirectory>,
    mailbox: Arc<MessageMailbox>,
    schedule: Schedule,
    shutdown: watch::Receiver<bool>,
) {
    run_cycles("mailbox-poll", schedule, shutdown, move || {
        let directory = directory.clone();
        let mailbox = mailbox.clone();
        async move { poll_once(&directory, &mailbox).await.status() }
    })
    .await;
}

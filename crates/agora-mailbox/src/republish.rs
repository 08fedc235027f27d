//! Background republish of authored pointers before they expire.

use std::sync::Arc;

use agora_types::Timestamp;
use tokio::sync::watch;

use crate::directory::{PointerDirectory, RepublishReport};
use crate::schedule::{run_cycles, CycleStatus, Schedule};

fn status_of(report: &RepublishReport) -> CycleStatus {
    if report.failures > 0 {
        CycleStatus::Failed
    } else if report.transient_failures > 0 && report.republished.is_empty() {
        CycleStatus::TransientFailure
    } else {
        CycleStatus::Healthy
    }
}

/// One republish pass, folded into a scheduler status.
pub async fn republish_cycle(directory: &PointerDirectory) -> CycleStatus {
    match directory.republish_due(Timestamp::now()).await {
        Ok(report) => status_of(&report),
        Err(e) if e.is_transient() => {
            tracing::warn!(error = %e, "republish pass failed");
            CycleStatus::TransientFailure
        }
        Err(e) => {
            tracing::error!(error = %e, "republish pass failed");
            CycleStatus::Failed
        }
    }
}

pub async fn run_republisher(directory: Arc<PointerDirectory>, schedule: Schedule, shutdown: watch::Receiver<bool>) {
    run_cycles("pointer-republish", schedule, shutdown, move || {
        let directory = directory.clone();
        async move { republish_cycle(&directory).await }
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::PointerId;

    #[test]
    fn status_reflects_failures() {
        let id = PointerId::new([1; 32]);
        assert_eq!(status_of(&RepublishReport::default()), CycleStatus::Healthy);
        assert_eq!(
            status_of(&RepublishReport {
                transient_failures: 2,
                ..Default::default()
            }),
            CycleStatus::TransientFailure
        );
        assert_eq!(
            status_of(&RepublishReport {
                republished: vec![(id, id)],
                transient_failures: 1,
                failures: 0,
            }),
            CycleStatus::Healthy
        );
        assert_eq!(
            status_of(&RepublishReport {
                failures: 1,
                ..Default::default()
            }),
            CycleStatus::Failed
        );
    }
}

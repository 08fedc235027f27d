//! Periodic background cycles with backoff and cooperative shutdown.
//!
//! A cycle that saw only transient failures delays the next one by
//! `min(2^n × base, cap)`, where `n` counts consecutive such cycles
//! starting at zero. Any other outcome resets `n` and waits the regular
//! interval.

use std::future::Future;
use std::time::Duration;

use agora_types::config::AppConfig;
use tokio::sync::watch;

/// Outcome of one cycle, as seen by the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleStatus {
    /// Nothing failed (or nothing was due).
    Healthy,
    /// Every failure in the cycle was transient.
    TransientFailure,
    /// At least one permanent failure; retried at the regular interval.
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,
    pub backoff_base_secs: u64,
    pub backoff_cap_secs: u64,
}

impl Schedule {
    pub fn new(interval: Duration, config: &AppConfig) -> Self {
        Self {
            interval,
            backoff_base_secs: config.backoff_base_secs,
            backoff_cap_secs: config.backoff_cap_secs,
        }
    }

    /// Delay before the next cycle after `transient_streak` consecutive
    /// transient-only cycles (zero means the last cycle was not one).
    pub fn next_delay(&self, transient_streak: u32) -> Duration {
        match transient_streak.checked_sub(1) {
            None => self.interval,
            Some(n) => Duration::from_secs(compute_backoff_secs(n, self.backoff_base_secs, self.backoff_cap_secs)),
        }
    }
}

/// `min(2^retry × base, cap)`, saturating.
pub fn compute_backoff_secs(retry: u32, base_secs: u64, cap_secs: u64) -> u64 {
    let factor = 1u64.checked_shl(retry.min(63)).unwrap_or(u64::MAX);
    factor.saturating_mul(base_secs).min(cap_secs)
}

/// Runs `cycle` immediately and then repeatedly until `shutdown` reads
/// `true` or its sender is dropped. An in-flight cycle is abandoned at
/// shutdown.
pub async fn run_cycles<F, Fut>(name: &'static str, schedule: Schedule, mut shutdown: watch::Receiver<bool>, mut cycle: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CycleStatus>,
{
    tracing::info!(task = name, interval_secs = schedule.interval.as_secs(), "background task started");
    let mut streak: u32 = 0;

    'cycles: loop {
        if *shutdown.borrow() {
            break;
        }

        // Only a `true` value or a dropped sender interrupts; other
        // changes leave the running cycle untouched.
        let run = cycle();
        tokio::pin!(run);
        let status = loop {
            tokio::select! {
                status = &mut run => break status,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break 'cycles;
                    }
                }
            }
        };

        streak = match status {
            CycleStatus::TransientFailure => streak.saturating_add(1),
            CycleStatus::Healthy | CycleStatus::Failed => 0,
        };
        let delay = schedule.next_delay(streak);
        if streak > 0 {
            tracing::warn!(task = name, streak, delay_secs = delay.as_secs(), "cycle failed transiently, backing off");
        }

        let pause = tokio::time::sleep(delay);
        tokio::pin!(pause);
        loop {
            tokio::select! {
                _ = &mut pause => break,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break 'cycles;
                    }
                }
            }
        }
    }

    tracing::info!(task = name, "background task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn backoff_sequence() {
        assert_eq!(compute_backoff_secs(0, 60, 3600), 60);
        assert_eq!(compute_backoff_secs(1, 60, 3600), 120);
        assert_eq!(compute_backoff_secs(5, 60, 3600), 1920);
        assert_eq!(compute_backoff_secs(6, 60, 3600), 3600);
        assert_eq!(compute_backoff_secs(u32::MAX, 60, 3600), 3600);
    }

    #[test]
    fn healthy_cycle_uses_interval() {
        let schedule = Schedule {
            interval: Duration::from_secs(600),
            backoff_base_secs: 60,
            backoff_cap_secs: 3600,
        };
        assert_eq!(schedule.next_delay(0), Duration::from_secs(600));
        assert_eq!(schedule.next_delay(1), Duration::from_secs(60));
        assert_eq!(schedule.next_delay(3), Duration::from_secs(240));
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        let schedule = Schedule {
            interval: Duration::from_millis(10),
            backoff_base_secs: 1,
            backoff_cap_secs: 1,
        };
        let task = tokio::spawn(run_cycles("test", schedule, rx, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                CycleStatus::Healthy
            }
        }));

        tokio::time::sleep(Duration::from_millis(60)).await;
        let _ = tx.send(true);
        let joined = tokio::time::timeout(Duration::from_secs(2), task).await;
        assert!(matches!(joined, Ok(Ok(()))));
        assert!(runs.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn false_change_does_not_restart_cycle() {
        let (tx, rx) = watch::channel(false);
        let started = Arc::new(AtomicU32::new(0));
        let finished = Arc::new(AtomicU32::new(0));
        let (s, f) = (started.clone(), finished.clone());
        let schedule = Schedule {
            interval: Duration::from_secs(60),
            backoff_base_secs: 1,
            backoff_cap_secs: 1,
        };
        let task = tokio::spawn(run_cycles("test", schedule, rx, move || {
            let (s, f) = (s.clone(), f.clone());
            async move {
                s.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                f.fetch_add(1, Ordering::SeqCst);
                CycleStatus::Healthy
            }
        }));

        tokio::time::sleep(Duration::from_millis(30)).await;
        let _ = tx.send(false);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 1);

        // A spurious change during the pause must not start the next cycle early.
        let _ = tx.send(false);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        let _ = tx.send(true);
        let joined = tokio::time::timeout(Duration::from_secs(2), task).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }
}

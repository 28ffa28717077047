// src/schedule.rs

use anyhow::Result;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{
    sync::Mutex,
    time::{interval, Interval, MissedTickBehavior},
};
use tracing::{info, warn};

/// Fires a job immediately and then every `interval`, never running two at once.
pub struct Scheduler {
    interval: Duration,
    active: Arc<Mutex<()>>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            active: Arc::new(Mutex::new(())),
        }
    }

    /// Ticks now, then every interval; ticks missed while the loop lagged are dropped.
    pub fn ticker(&self) -> Interval {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }

    /// Start `job` unless a previous run still holds the slot.
    ///
    /// Returns `false` when the trigger was skipped.
    pub fn trigger<F, Fut>(&self, job: &F) -> bool
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let guard = match Arc::clone(&self.active).try_lock_owned() {
            Ok(g) => g,
            Err(_) => {
                warn!("previous run still active; skipping this trigger");
                return false;
            }
        };
        let run = job();
        tokio::spawn(async move {
            run.await;
            drop(guard);
        });
        true
    }

    /// Tick forever, or `max_ticks` times when given. Missed ticks are not replayed.
    pub async fn run<F, Fut>(&self, job: F, max_ticks: Option<u64>) -> Result<()>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut ticker = self.ticker();
        info!(interval = ?self.interval, "scheduler started");

        let mut ticks = 0u64;
        loop {
            if max_ticks.map_or(false, |m| ticks >= m) {
                break;
            }
            ticker.tick().await;
            ticks += 1;
            if self.trigger(&job) {
                info!(tick = ticks, "run triggered");
            }
        }

        // let the last triggered run finish before returning
        let _idle = self.active.lock().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    #[tokio::test]
    async fn fires_immediately_then_on_interval() -> Result<()> {
        let runs = Arc::new(AtomicUsize::new(0));
        let sched = Scheduler::new(Duration::from_millis(20));
        let counter = Arc::clone(&runs);
        sched
            .run(
                move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                },
                Some(3),
            )
            .await?;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn lagging_ticker_does_not_catch_up() {
        let sched = Scheduler::new(Duration::from_secs(10));
        let mut ticker = sched.ticker();
        let start = Instant::now();
        ticker.tick().await;

        // nobody polled the ticker for three and a half intervals
        tokio::time::advance(Duration::from_secs(35)).await;
        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(35));

        // the next tick waits for the next interval boundary, no burst
        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn long_run_gets_one_follow_up() -> Result<()> {
        let starts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sched = Scheduler::new(Duration::from_secs(10));
        let origin = Instant::now();
        let log = Arc::clone(&starts);
        sched
            .run(
                move || {
                    let log = Arc::clone(&log);
                    async move {
                        log.lock().expect("start log").push(origin.elapsed());
                        tokio::time::sleep(Duration::from_secs(35)).await;
                    }
                },
                Some(5),
            )
            .await?;

        // ticks at 0, 10, 20, 30, 40: the middle three land on the active run
        let starts = starts.lock().expect("start log").clone();
        assert_eq!(starts, vec![Duration::ZERO, Duration::from_secs(40)]);
        Ok(())
    }

    #[tokio::test]
    async fn overlapping_trigger_is_skipped() -> Result<()> {
        let runs = Arc::new(AtomicUsize::new(0));
        let sched = Scheduler::new(Duration::from_secs(3600));
        let counter = Arc::clone(&runs);
        let job = move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };

        assert!(sched.trigger(&job));
        assert!(!sched.trigger(&job));

        // once the first run is done the slot frees up again
        let _ = sched.active.lock().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(sched.trigger(&job));
        let _ = sched.active.lock().await;
        Ok(())
    }
}

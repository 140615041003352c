use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

/// Per-session countdown. Expires exactly `total_seconds` after it starts,
/// runs its expiry callback once, and republishes the remaining whole seconds
/// every `tick` in between.
///
/// Must be started from within a Tokio runtime.
#[derive(Debug)]
pub struct CountdownTimer {
    remaining: watch::Receiver<u64>,
    fired: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl CountdownTimer {
    pub fn start<F>(total_seconds: u64, tick: Duration, on_expiry: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (tx, rx) = watch::channel(total_seconds);
        let fired = Arc::new(AtomicBool::new(false));
        let fired_flag = fired.clone();
        let started = Instant::now();
        let deadline = started + Duration::from_secs(total_seconds);

        let task = tokio::spawn(async move {
            if total_seconds > 0 {
                let mut ticker = interval_at(started + tick, tick);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                let expiry = sleep_until(deadline);
                tokio::pin!(expiry);

                loop {
                    tokio::select! {
                        biased;
                        _ = &mut expiry => break,
                        _ = ticker.tick() => {
                            let remaining =
                                total_seconds.saturating_sub(started.elapsed().as_secs());
                            tx.send_if_modified(|current| {
                                let changed = *current != remaining;
                                *current = remaining;
                                changed
                            });
                        }
                    }
                }
            }
            tx.send_replace(0);

            if !fired_flag.swap(true, Ordering::SeqCst) {
                tracing::debug!("Countdown of {}s expired", total_seconds);
                on_expiry();
            }
        });

        Self {
            remaining: rx,
            fired,
            task,
        }
    }

    pub fn remaining(&self) -> u64 {
        *self.remaining.borrow()
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Receiver for the remaining seconds. Closes once the countdown stops.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.remaining.clone()
    }

    /// Stops future ticks. No-op once the expiry has fired.
    pub fn cancel(&self) {
        if !self.task.is_finished() {
            self.task.abort();
        }
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

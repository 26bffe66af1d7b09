//! Cancellable scheduled tasks
//!
//! The coordinator owns one `ScheduledTask` per timer (inactivity stop,
//! progress updates). Scheduling replaces any pending run, `cancel` is
//! idempotent and dropping the task cancels it, so a timer can never outlive
//! its owner.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

pub struct ScheduledTask {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    pub fn new(name: &'static str) -> Self {
        Self { name, handle: None }
    }

    /// Run `action` once after `delay`, replacing any pending run
    pub fn schedule_once<F>(&mut self, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Cannot schedule {} timer outside a runtime", self.name);
            return;
        };
        debug!("Scheduling {} timer in {:?}", self.name, delay);
        self.handle = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        }));
    }

    /// Run `action` every `period`, first after one full period
    ///
    /// Missed ticks are skipped rather than bunched. The task ends when
    /// `action` returns `false`.
    pub fn schedule_repeating<F>(&mut self, period: Duration, mut action: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        self.cancel();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Cannot schedule {} timer outside a runtime", self.name);
            return;
        };
        debug!("Scheduling {} timer every {:?}", self.name, period);
        self.handle = Some(runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !action() {
                    break;
                }
            }
        }));
    }

    /// Cancel the pending run; returns whether anything was pending
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                if pending {
                    debug!("Cancelled {} timer", self.name);
                }
                pending
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

//! Recurring automatic polls.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use bstock_client::types::MIN_CHECK_INTERVAL_MINUTES;
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::poller::{check_all_until, PollTrigger};
use crate::state::AppContext;

/// A running timer. Cancelling stops it while idle or between two items of a
/// poll; an item being fetched is always finished first.
#[derive(Debug)]
pub struct SchedulerHandle {
    token: CancellationToken,
    interval_minutes: u32,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Cancels the timer and waits for its task, including any poll in
    /// progress, to wind down.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(error) = self.task.await {
            warn!(target: "bstock_scheduler", error = %error, "scheduler task ended abnormally");
        }
    }

    pub fn interval_minutes(&self) -> u32 {
        self.interval_minutes
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.task.is_finished()
    }
}

/// Arms a timer that runs a scheduled poll every `interval_minutes`, the first
/// one after the context's start-up delay.
///
/// The task only holds a weak reference to the context and stops on its own
/// once the context is dropped.
pub fn spawn(context: &Arc<AppContext>, interval_minutes: u32) -> SchedulerHandle {
    let interval_minutes = interval_minutes.max(MIN_CHECK_INTERVAL_MINUTES);
    let period = Duration::from_secs(u64::from(interval_minutes) * 60);
    let token = CancellationToken::new();
    let cancelled = token.clone();
    let weak: Weak<AppContext> = Arc::downgrade(context);
    let first_tick = Instant::now() + context.options.startup_delay;

    let task = tokio::spawn(async move {
        let mut ticker = time::interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancelled.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(context) = weak.upgrade() else {
                break;
            };
            if let Err(error) = check_all_until(&context, PollTrigger::Scheduled, &cancelled).await {
                warn!(target: "bstock_scheduler", error = %error, "scheduled poll failed");
            }
        }
        debug!(target: "bstock_scheduler", "scheduler stopped");
    });

    info!(
        target: "bstock_scheduler",
        interval_minutes,
        "automatic checks scheduled"
    );
    SchedulerHandle {
        token,
        interval_minutes,
        task,
    }
}

/// Replaces whatever timer is running with one matching the settings.
/// Returns the effective interval when a timer is armed.
pub async fn configure(
    context: &Arc<AppContext>,
    enabled: bool,
    interval_minutes: u32,
) -> Option<u32> {
    let mut guard = context.state.scheduler.lock().await;
    if let Some(existing) = guard.take() {
        existing.stop().await;
    }
    if !enabled {
        info!(target: "bstock_scheduler", "automatic checks disabled");
        return None;
    }
    let handle = spawn(context, interval_minutes);
    let effective = handle.interval_minutes();
    *guard = Some(handle);
    Some(effective)
}

/// Arms the timer from persisted settings, as done on start-up.
pub async fn restore(context: &Arc<AppContext>) -> Option<u32> {
    let settings = context.store.settings().await;
    if !settings.auto_check_enabled {
        return None;
    }
    configure(context, true, settings.check_interval_minutes).await
}

/// Stops the timer, letting an in-flight poll settle its items first.
pub async fn shutdown(context: &AppContext) {
    let handle = context.state.scheduler.lock().await.take();
    if let Some(handle) = handle {
        handle.stop().await;
    }
}

pub async fn is_running(context: &AppContext) -> bool {
    context
        .state
        .scheduler
        .lock()
        .await
        .as_ref()
        .is_some_and(SchedulerHandle::is_running)
}

//! Periodic poll loop: one cycle per tick, gated by the notification window,
//! with every notification handed to every configured notifier.

use crate::poller::{Poller, Watch};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use xrelay_core::{post::Notification, traits::Notifier};

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    OutsideWindow,
    NotConfigured,
    Failed,
    Delivered(usize),
}

pub struct Scheduler {
    poller: Poller,
    notifiers: Vec<Arc<dyn Notifier>>,
    watch: Watch,
    interval: Duration,
}

impl Scheduler {
    pub fn new(
        poller: Poller,
        notifiers: Vec<Arc<dyn Notifier>>,
        watch: Watch,
        interval: Duration,
    ) -> Self {
        Self {
            poller,
            notifiers,
            watch,
            interval,
        }
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    /// Tick until `shutdown` resolves. A tick already running is allowed to
    /// finish before the loop exits.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            "scheduler: polling every {}s, window {}",
            self.interval.as_secs(),
            self.poller.window()
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("scheduler: shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    pub async fn tick(&self) -> TickOutcome {
        self.tick_at(Utc::now()).await
    }

    /// One tick judged against `now`, for both the window gate and the
    /// poll cycle.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickOutcome {
        if !self.poller.window().is_in_window(&now) {
            return TickOutcome::OutsideWindow;
        }
        if !self.watch.is_configured() {
            warn!("scheduler: monitor handle or keywords not set, skipping");
            return TickOutcome::NotConfigured;
        }

        match self.poller.run_cycle_at(&self.watch, now).await {
            Ok(notifications) => {
                for notification in &notifications {
                    self.deliver(notification).await;
                }
                TickOutcome::Delivered(notifications.len())
            }
            Err(e) => {
                error!("scheduler: poll cycle failed: {e}");
                TickOutcome::Failed
            }
        }
    }

    async fn deliver(&self, notification: &Notification) {
        if self.notifiers.is_empty() {
            info!("notification (no channel): {}", notification.message);
            return;
        }
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(notification).await {
                error!("{}: delivery failed: {e}", notifier.name());
            }
        }
    }
}

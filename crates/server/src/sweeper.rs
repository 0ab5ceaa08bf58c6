use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use pesto_core::suggestions::CooldownStore;

/// Periodically drops expired cooldown entries so the map stays bounded by
/// the members tagged within one cooldown window.
pub fn spawn(cooldowns: Arc<CooldownStore>, interval: Duration) -> JoinHandle<()> {
    let interval = interval.max(Duration::from_millis(1));
    info!(
        event_name = "system.sweeper.start",
        interval_secs = interval.as_secs(),
        "cooldown sweeper started"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_once(&cooldowns);
        }
    })
}

pub fn sweep_once(cooldowns: &CooldownStore) -> usize {
    let removed = cooldowns.prune_expired();
    debug!(
        event_name = "system.sweeper.pruned",
        removed,
        remaining = cooldowns.len(),
        "expired cooldowns pruned"
    );
    removed
}

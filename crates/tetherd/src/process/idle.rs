//! Shuts the agent down after a period without open channels.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::info;

use super::PROCESS_TARGET;
use crate::agent::Agent;
use crate::channel::ChannelEvent;

const IDLE_TICK: Duration = Duration::from_secs(1);

/// Counts dispatcher ticks with no open channel and requests shutdown once
/// the count covers the idle timeout. Any channel close restarts the count.
#[derive(Debug, Clone)]
pub struct IdleMonitor {
    limit: u64,
    tick: Duration,
    ticks: Arc<AtomicU64>,
}

impl IdleMonitor {
    /// Starts monitoring with one-second ticks.
    pub fn install(agent: &mut Agent, timeout: Duration) -> Self {
        Self::install_with_tick(agent, timeout, IDLE_TICK)
    }

    /// Starts monitoring with a custom tick length.
    pub fn install_with_tick(agent: &mut Agent, timeout: Duration, tick: Duration) -> Self {
        let tick = tick.max(Duration::from_millis(1));
        let limit = timeout.as_nanos().div_ceil(tick.as_nanos()).max(1);
        let monitor = Self {
            limit: u64::try_from(limit).unwrap_or(u64::MAX),
            tick,
            ticks: Arc::new(AtomicU64::new(0)),
        };
        let ticks = Arc::clone(&monitor.ticks);
        agent.add_channel_listener(ChannelEvent::Closed, move |_, _| {
            ticks.store(0, Ordering::Relaxed);
        });
        monitor.schedule(agent);
        monitor
    }

    /// Consecutive ticks seen without an open channel.
    #[must_use]
    pub fn idle_ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn schedule(&self, agent: &Agent) {
        let monitor = self.clone();
        agent
            .poster()
            .post_delayed(self.tick, move |agent: &mut Agent| monitor.tick(agent));
    }

    fn tick(&self, agent: &mut Agent) {
        if agent.is_shutting_down() {
            return;
        }
        if agent.channels().open_count() > 0 {
            self.ticks.store(0, Ordering::Relaxed);
        } else {
            let idle = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
            if idle >= self.limit {
                info!(
                    target: PROCESS_TARGET,
                    idle_ticks = idle,
                    tick_ms = self.tick.as_millis(),
                    "idle timeout reached"
                );
                agent.request_shutdown();
                return;
            }
        }
        self.schedule(agent);
    }
}

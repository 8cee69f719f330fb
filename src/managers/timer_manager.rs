//! Keyed one-shot timers on top of spawned tokio tasks.
//!
//! Every delayed action in the bot (verification deadlines, ticket
//! inactivity warnings and closes, SLA escalations) is scheduled here under
//! a typed key. Scheduling under an occupied key replaces the previous
//! timer, which gives the ticket manager its last-write-wins rearm
//! semantics for free. Cancellation is "abort if present" and tolerates
//! keys that were never scheduled or have already fired.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use poise::serenity_prelude::{ChannelId, UserId};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Identity of a scheduled timer. One live timer per key at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Deadline for a member to finish verification.
    VerifyDeadline(UserId),
    /// Inactivity warning for a ticket channel.
    TicketWarning(ChannelId),
    /// Inactivity auto-close for a ticket channel.
    TicketClose(ChannelId),
    /// Unclaimed-ticket staff escalation.
    SlaStaff(ChannelId),
    /// Unclaimed-ticket admin escalation.
    SlaAdmin(ChannelId),
}

impl TimerKey {
    /// All keys a single ticket channel can own.
    pub fn ticket_keys(channel_id: ChannelId) -> [TimerKey; 4] {
        [
            TimerKey::TicketWarning(channel_id),
            TimerKey::TicketClose(channel_id),
            TimerKey::SlaStaff(channel_id),
            TimerKey::SlaAdmin(channel_id),
        ]
    }
}

/// Schedules and cancels delayed callbacks keyed by [`TimerKey`].
pub struct TimerManager {
    tasks: DashMap<TimerKey, JoinHandle<()>>,
}

impl TimerManager {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
        }
    }

    /// Arm `callback` to run after `delay`. Replaces (and aborts) any timer
    /// already scheduled under the same key; the swap happens under the map
    /// shard lock so two racing rearms still leave exactly one live timer.
    ///
    /// The callback runs in its own detached task: cancelling a key only
    /// stops timers that have not fired yet, never a callback already in
    /// flight (an auto-close callback cancels its own key while running).
    pub fn schedule<F>(&self, key: TimerKey, delay: Duration, callback: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(callback);
        });

        match self.tasks.entry(key) {
            Entry::Occupied(mut entry) => {
                entry.get().abort();
                entry.insert(handle);
            }
            Entry::Vacant(entry) => {
                entry.insert(handle);
            }
        }
        debug!("Scheduled timer {:?} in {:?}", key, delay);
    }

    /// Cancel the timer under `key` if one is pending. Cancelling an absent
    /// or already-fired timer is a no-op.
    pub fn cancel(&self, key: TimerKey) {
        if let Some((_, handle)) = self.tasks.remove(&key) {
            handle.abort();
            debug!("Cancelled timer {:?}", key);
        }
    }

    /// Cancel every timer belonging to a ticket channel.
    pub fn cancel_ticket(&self, channel_id: ChannelId) {
        for key in TimerKey::ticket_keys(channel_id) {
            self.cancel(key);
        }
    }

    /// Whether a timer under `key` is armed and has not fired yet.
    pub fn is_pending(&self, key: TimerKey) -> bool {
        self.tasks
            .get(&key)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Number of armed, not-yet-fired timers.
    pub fn pending_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|entry| !entry.value().is_finished())
            .count()
    }
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared timer manager type
pub type SharedTimerManager = Arc<TimerManager>;

pub fn create_shared_timer_manager() -> SharedTimerManager {
    Arc::new(TimerManager::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn key() -> TimerKey {
        TimerKey::TicketClose(ChannelId::new(42))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let timers = TimerManager::new();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = fired.clone();
        timers.schedule(key(), Duration::from_secs(60), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timers.is_pending(key()));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timers.is_pending(key()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_timer() {
        let timers = TimerManager::new();
        let fired = Arc::new(AtomicU32::new(0));

        for _ in 0..5 {
            let counter = fired.clone();
            timers.schedule(key(), Duration::from_secs(60), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(timers.pending_count(), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1, "only the last rearm fires");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let timers = TimerManager::new();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = fired.clone();
        timers.schedule(key(), Duration::from_secs(60), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        timers.cancel(key());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(timers.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_absent_key_is_noop() {
        let timers = TimerManager::new();
        timers.cancel(key());
        timers.cancel_ticket(ChannelId::new(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_fires_before_close() {
        // Inactivity limit 30 minutes, warning lead 5: warning at minute 25,
        // close at minute 30.
        let timers = TimerManager::new();
        let channel = ChannelId::new(42);
        let warned = Arc::new(AtomicU32::new(0));
        let closed = Arc::new(AtomicU32::new(0));

        let counter = warned.clone();
        timers.schedule(
            TimerKey::TicketWarning(channel),
            Duration::from_secs(25 * 60),
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        let counter = closed.clone();
        timers.schedule(
            TimerKey::TicketClose(channel),
            Duration::from_secs(30 * 60),
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::sleep(Duration::from_secs(25 * 60 + 1)).await;
        assert_eq!(warned.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(warned.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_ticket_clears_all_four() {
        let timers = TimerManager::new();
        let channel = ChannelId::new(42);
        for timer_key in TimerKey::ticket_keys(channel) {
            timers.schedule(timer_key, Duration::from_secs(60), async {});
        }
        assert_eq!(timers.pending_count(), 4);

        timers.cancel_ticket(channel);
        assert_eq!(timers.pending_count(), 0);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(timers.pending_count(), 0);
    }
}

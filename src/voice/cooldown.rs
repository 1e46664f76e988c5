use dashmap::{DashMap, mapref::entry::Entry};
use serenity::all::UserId;
use std::time::Duration;
use tokio::time::Instant;

/// Per-user rate limit for join-to-create hub joins
#[derive(Debug, Default)]
pub struct Cooldowns {
    last_use: DashMap<UserId, Instant>,
}

impl Cooldowns {
    /// Start a new window for the user unless one is still running.
    ///
    /// A refused attempt does not extend the running window.
    pub fn try_acquire(&self, user_id: UserId, window: Duration) -> bool {
        let now = Instant::now();
        match self.last_use.entry(user_id) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) < window {
                    false
                } else {
                    entry.insert(now);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_window_expires() {
        let cooldowns = Cooldowns::default();
        let user = UserId::new(1);
        let window = Duration::from_secs(10);

        assert!(cooldowns.try_acquire(user, window));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!cooldowns.try_acquire(user, window));
        // Other users are unaffected
        assert!(cooldowns.try_acquire(UserId::new(2), window));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cooldowns.try_acquire(user, window));
    }
}

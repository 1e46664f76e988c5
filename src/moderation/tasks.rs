use dashmap::DashMap;
use serenity::all::{GuildId, UserId};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::AbortHandle;

struct Scheduled {
    generation: u64,
    handle: AbortHandle,
}

/// Pending unmute tasks, at most one per (guild, user)
///
/// Each task carries a generation so a task that finishes after being replaced
/// cannot remove its replacement's entry.
#[derive(Default)]
pub struct UnmuteTasks {
    tasks: DashMap<(GuildId, UserId), Scheduled>,
    next_generation: AtomicU64,
}

impl std::fmt::Debug for UnmuteTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnmuteTasks")
            .field("pending", &self.tasks.len())
            .finish()
    }
}

impl UnmuteTasks {
    pub fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Track a freshly spawned task, aborting whatever it replaces
    pub fn insert(&self, guild_id: GuildId, user_id: UserId, generation: u64, handle: AbortHandle) {
        if let Some(previous) = self
            .tasks
            .insert((guild_id, user_id), Scheduled { generation, handle })
        {
            previous.handle.abort();
        }
    }

    /// Abort and forget the pair's task; returns whether one was pending
    pub fn cancel(&self, guild_id: GuildId, user_id: UserId) -> bool {
        self.tasks
            .remove(&(guild_id, user_id))
            .map(|(_, scheduled)| scheduled.handle.abort())
            .is_some()
    }

    /// Called by a task when it completes
    pub fn finish(&self, guild_id: GuildId, user_id: UserId, generation: u64) {
        self.tasks
            .remove_if(&(guild_id, user_id), |_, scheduled| scheduled.generation == generation);
    }

    #[must_use]
    pub fn is_scheduled(&self, guild_id: GuildId, user_id: UserId) -> bool {
        self.tasks.contains_key(&(guild_id, user_id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

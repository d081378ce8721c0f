//! Matchmaking
//!
//! One FIFO queue per mode. Pairing happens inside `enqueue` under the
//! queue lock, so two participants can never be handed to two different
//! matches. Bot mode never queues.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::game::state::PlayerId;
use crate::network::auth::Identity;
use crate::network::coordinator::Participant;
use crate::network::protocol::{MatchMode, ServerMessage};

/// Matchmaking queue entry.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    /// Who is waiting.
    pub identity: Identity,
    /// Mode waited for.
    pub mode: MatchMode,
    /// When they joined.
    pub queued_at: Instant,
    /// Where to notify them.
    pub sender: mpsc::Sender<ServerMessage>,
}

impl From<QueueEntry> for Participant {
    fn from(entry: QueueEntry) -> Self {
        Participant {
            identity: entry.identity,
            sender: entry.sender,
        }
    }
}

/// Result of joining a queue.
#[derive(Debug)]
pub enum EnqueueOutcome {
    /// Waiting at this 1-based position.
    Queued {
        /// Position in the mode's queue.
        position: u32,
    },
    /// Already waiting; nothing changed.
    AlreadyQueued {
        /// Mode already queued for.
        mode: MatchMode,
        /// Position in that queue.
        position: u32,
    },
    /// Two oldest entries taken out of the queue, oldest first.
    Paired(QueueEntry, QueueEntry),
}

/// FIFO matchmaking queues.
pub struct Matchmaker {
    queues: RwLock<BTreeMap<MatchMode, VecDeque<QueueEntry>>>,
}

impl Matchmaker {
    /// Create empty queues.
    pub fn new() -> Self {
        Self {
            queues: RwLock::new(BTreeMap::new()),
        }
    }

    /// Join the queue for `mode`, pairing immediately when someone waits.
    pub async fn enqueue(
        &self,
        mode: MatchMode,
        identity: Identity,
        sender: mpsc::Sender<ServerMessage>,
    ) -> EnqueueOutcome {
        let mut queues = self.queues.write().await;

        if let Some((mode, position)) = find(&queues, &identity.player_id) {
            return EnqueueOutcome::AlreadyQueued { mode, position };
        }

        let queue = queues.entry(mode).or_default();
        // Drop waiters whose connection is already gone
        queue.retain(|e| !e.sender.is_closed());

        debug!("Player {} queued for {:?}", identity.player_id.short_hex(), mode);
        queue.push_back(QueueEntry {
            identity,
            mode,
            queued_at: Instant::now(),
            sender,
        });

        if queue.len() >= 2 {
            if let (Some(first), Some(second)) = (queue.pop_front(), queue.pop_front()) {
                return EnqueueOutcome::Paired(first, second);
            }
        }

        EnqueueOutcome::Queued {
            position: queue.len() as u32,
        }
    }

    /// Leave whatever queue the player is in. Returns the mode left.
    pub async fn cancel(&self, player_id: &PlayerId) -> Option<MatchMode> {
        let mut queues = self.queues.write().await;
        for (mode, queue) in queues.iter_mut() {
            if let Some(idx) = queue.iter().position(|e| e.identity.player_id == *player_id) {
                queue.remove(idx);
                debug!("Player {} left the {:?} queue", player_id.short_hex(), mode);
                return Some(*mode);
            }
        }
        None
    }

    /// Remove and return entries that waited longer than `timeout`.
    pub async fn expire(&self, now: Instant, timeout: Duration) -> Vec<QueueEntry> {
        let mut queues = self.queues.write().await;
        let mut expired = Vec::new();
        for queue in queues.values_mut() {
            let (stale, fresh): (VecDeque<_>, VecDeque<_>) = queue
                .drain(..)
                .partition(|e| now.saturating_duration_since(e.queued_at) > timeout);
            *queue = fresh;
            expired.extend(stale);
        }
        expired
    }

    /// Current queue and position of a player.
    pub async fn position(&self, player_id: &PlayerId) -> Option<(MatchMode, u32)> {
        find(&*self.queues.read().await, player_id)
    }

    /// Waiters for one mode.
    pub async fn queue_len(&self, mode: MatchMode) -> usize {
        self.queues.read().await.get(&mode).map_or(0, VecDeque::len)
    }

    /// Waiters across all modes.
    pub async fn total_len(&self) -> usize {
        self.queues.read().await.values().map(VecDeque::len).sum()
    }
}

impl Default for Matchmaker {
    fn default() -> Self {
        Self::new()
    }
}

fn find(
    queues: &BTreeMap<MatchMode, VecDeque<QueueEntry>>,
    player_id: &PlayerId,
) -> Option<(MatchMode, u32)> {
    queues.iter().find_map(|(mode, queue)| {
        queue
            .iter()
            .position(|e| e.identity.player_id == *player_id)
            .map(|idx| (*mode, idx as u32 + 1))
    })
}

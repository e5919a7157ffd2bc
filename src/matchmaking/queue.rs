//! Matchmaking queue implementation

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::game::ClientId;

/// Client waiting for an opponent
#[derive(Debug, Clone)]
pub struct QueuedClient {
    pub client_id: ClientId,
    pub queued_at: Instant,
}

impl QueuedClient {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            queued_at: Instant::now(),
        }
    }

    /// How long this client has been waiting
    pub fn wait_time(&self) -> Duration {
        self.queued_at.elapsed()
    }
}

/// Strict FIFO waiting line; a client appears at most once
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    queue: VecDeque<QueuedClient>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client to the back of the queue. Returns false if it was already waiting,
    /// in which case its place is kept.
    pub fn enqueue(&mut self, client_id: ClientId) -> bool {
        if self.contains(&client_id) {
            return false;
        }
        self.queue.push_back(QueuedClient::new(client_id));
        true
    }

    /// Remove a client from the queue
    pub fn dequeue(&mut self, client_id: ClientId) -> Option<QueuedClient> {
        let pos = self.queue.iter().position(|c| c.client_id == client_id)?;
        self.queue.remove(pos)
    }

    /// Check if a client is in the queue
    pub fn contains(&self, client_id: &ClientId) -> bool {
        self.queue.iter().any(|c| &c.client_id == client_id)
    }

    /// Get queue length
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take the two longest-waiting clients, oldest first, if at least two are waiting
    pub fn try_pop_pair(&mut self) -> Option<(QueuedClient, QueuedClient)> {
        if self.queue.len() < 2 {
            return None;
        }
        let first = self.queue.pop_front()?;
        let second = self.queue.pop_front()?;
        Some((first, second))
    }
}

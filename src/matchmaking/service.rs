//! Matchmaking service - manages the waiting queue and hands pairs to the room manager

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::game::{ClientId, RoomId, RoomManager};
use crate::ws::connections::Outbound;
use crate::ws::protocol::ServerMsg;

use super::queue::MatchmakingQueue;

/// Matchmaker
pub struct Matchmaker {
    queue: Mutex<MatchmakingQueue>,
    rooms: Arc<RoomManager>,
    outbound: Arc<dyn Outbound>,
}

impl Matchmaker {
    pub fn new(rooms: Arc<RoomManager>, outbound: Arc<dyn Outbound>) -> Self {
        Self {
            queue: Mutex::new(MatchmakingQueue::new()),
            rooms,
            outbound,
        }
    }

    /// Join the queue. A client already waiting is left where it is.
    /// Returns the room created if this join completed a pair.
    pub async fn join(&self, client_id: ClientId) -> Option<RoomId> {
        let mut queue = self.queue.lock().await;

        if !queue.enqueue(client_id) {
            debug!(client_id = %client_id, "Client already in matchmaking queue");
            return None;
        }

        let waiting = queue.len();
        info!(client_id = %client_id, queue_size = waiting, "Client joined matchmaking queue");
        self.outbound.send(client_id, &ServerMsg::QueueStatus { waiting });
        self.outbound.broadcast(&ServerMsg::QueueUpdate { waiting });

        let (left, right) = queue.try_pop_pair()?;
        self.outbound.broadcast(&ServerMsg::QueueUpdate {
            waiting: queue.len(),
        });

        info!(
            left = %left.client_id,
            right = %right.client_id,
            left_wait_ms = left.wait_time().as_millis() as u64,
            "Paired clients"
        );

        // Created under the queue lock so a concurrent leave/disconnect of either
        // client is ordered after the room exists and finds it.
        Some(self.rooms.create_room(left.client_id, right.client_id))
    }

    /// Leave the queue; no-op if the client is not waiting. The queue length is
    /// re-broadcast either way.
    pub async fn leave(&self, client_id: ClientId) -> bool {
        let mut queue = self.queue.lock().await;
        let removed = queue.dequeue(client_id).is_some();
        if removed {
            info!(client_id = %client_id, queue_size = queue.len(), "Client left matchmaking queue");
        }
        self.outbound.broadcast(&ServerMsg::QueueUpdate {
            waiting: queue.len(),
        });
        removed
    }

    /// Get current queue size
    pub async fn queue_size(&self) -> usize {
        self.queue.lock().await.len()
    }

    #[cfg(test)]
    async fn is_in_queue(&self, client_id: &ClientId) -> bool {
        self.queue.lock().await.contains(client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Players, RoomSettings};
    use crate::ws::connections::recording::RecordingOutbound;
    use crate::ws::protocol::EndReason;
    use uuid::Uuid;

    fn setup() -> (Matchmaker, Arc<RoomManager>, Arc<RecordingOutbound>) {
        let outbound = Arc::new(RecordingOutbound::new());
        let rooms = Arc::new(RoomManager::new(RoomSettings::default(), outbound.clone()));
        let matchmaker = Matchmaker::new(rooms.clone(), outbound.clone());
        (matchmaker, rooms, outbound)
    }

    #[tokio::test]
    async fn second_join_creates_a_room_in_arrival_order() {
        let (matchmaker, rooms, outbound) = setup();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(matchmaker.join(a).await.is_none());
        let room_id = matchmaker.join(b).await.unwrap();

        assert_eq!(rooms.lookup(&room_id).unwrap().players, Players { left: a, right: b });
        assert_eq!(matchmaker.queue_size().await, 0);
        assert_eq!(
            outbound.messages_for(a).first(),
            Some(&ServerMsg::QueueStatus { waiting: 1 })
        );
        assert_eq!(
            outbound.broadcasts(),
            vec![
                ServerMsg::QueueUpdate { waiting: 1 },
                ServerMsg::QueueUpdate { waiting: 2 },
                ServerMsg::QueueUpdate { waiting: 0 },
            ]
        );

        rooms.terminate_all(EndReason::ServerShutdown).await;
    }

    #[tokio::test]
    async fn duplicate_join_is_a_silent_no_op() {
        let (matchmaker, _, outbound) = setup();
        let a = Uuid::new_v4();

        matchmaker.join(a).await;
        assert!(matchmaker.join(a).await.is_none());

        assert_eq!(matchmaker.queue_size().await, 1);
        let statuses = outbound
            .messages_for(a)
            .into_iter()
            .filter(|m| matches!(m, ServerMsg::QueueStatus { .. }))
            .count();
        assert_eq!(statuses, 1);
    }

    #[tokio::test]
    async fn odd_and_even_joiners_are_paired() {
        let (matchmaker, rooms, _) = setup();
        let clients: Vec<ClientId> = (0..6).map(|_| Uuid::new_v4()).collect();

        let mut created = Vec::new();
        for client in &clients {
            if let Some(room_id) = matchmaker.join(*client).await {
                created.push(rooms.lookup(&room_id).unwrap().players);
            }
        }

        let expected: Vec<Players> = clients
            .chunks(2)
            .map(|pair| Players { left: pair[0], right: pair[1] })
            .collect();
        assert_eq!(created, expected);

        rooms.terminate_all(EndReason::ServerShutdown).await;
    }

    #[tokio::test]
    async fn leave_then_rejoin_never_pairs_with_itself() {
        let (matchmaker, rooms, outbound) = setup();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        matchmaker.join(a).await;
        assert!(matchmaker.leave(a).await);
        assert!(!matchmaker.leave(a).await);
        assert!(matchmaker.join(a).await.is_none());
        assert!(matchmaker.is_in_queue(&a).await);

        let room_id = matchmaker.join(b).await.unwrap();
        assert_eq!(rooms.lookup(&room_id).unwrap().players, Players { left: a, right: b });
        assert!(!matchmaker.is_in_queue(&a).await);

        // Every leave re-broadcasts, even the no-op one
        let updates_after_leaves = outbound.broadcasts()[1..3].to_vec();
        assert_eq!(
            updates_after_leaves,
            vec![ServerMsg::QueueUpdate { waiting: 0 }, ServerMsg::QueueUpdate { waiting: 0 }]
        );

        rooms.terminate_all(EndReason::ServerShutdown).await;
    }
}

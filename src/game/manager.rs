//! Room index and routing of per-room requests

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::util::time::unix_millis;
use crate::ws::connections::Outbound;
use crate::ws::protocol::{EndReason, RoomSummary, ServerMsg};

use super::physics::Side;
use super::room::{Players, Room, RoomCommand, RoomHandle, RoomSettings};
use super::{ClientId, RoomId};

/// Errors from room requests. Only `RoomNotFound` on a spectate join is ever shown to
/// a client; everything else is dropped by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    #[error("Invalid input: {0}")]
    InvalidInput(&'static str),
}

/// Creates, indexes and destroys rooms
pub struct RoomManager {
    rooms: DashMap<RoomId, RoomHandle>,
    /// Rooms each client plays in or watches, for disconnect cleanup
    memberships: DashMap<ClientId, HashSet<RoomId>>,
    outbound: Arc<dyn Outbound>,
    settings: RoomSettings,
}

impl RoomManager {
    pub fn new(settings: RoomSettings, outbound: Arc<dyn Outbound>) -> Self {
        Self {
            rooms: DashMap::new(),
            memberships: DashMap::new(),
            outbound,
            settings,
        }
    }

    /// Start a match between `left` and `right`. Each player is told their side before
    /// the first snapshot can reach them.
    pub fn create_room(&self, left: ClientId, right: ClientId) -> RoomId {
        let players = Players { left, right };

        let room_id = loop {
            let candidate = generate_room_id();
            match self.rooms.entry(candidate.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    for (client_id, side) in [(left, Side::Left), (right, Side::Right)] {
                        self.outbound.send(
                            client_id,
                            &ServerMsg::MatchStart {
                                room_id: candidate.clone(),
                                side,
                            },
                        );
                    }
                    let handle = Room::spawn(
                        candidate.clone(),
                        players,
                        rand::random(),
                        self.settings.clone(),
                        self.outbound.clone(),
                    );
                    slot.insert(handle);
                    break candidate;
                }
            }
        };

        for client_id in [left, right] {
            self.remember(client_id, &room_id);
        }

        info!(
            room_id = %room_id,
            left = %left,
            right = %right,
            active_rooms = self.rooms.len(),
            "Room created"
        );
        room_id
    }

    pub fn lookup(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.get(room_id).map(|r| r.value().clone())
    }

    /// Set a player's paddle velocity. Rejected if the room is unknown, the sender is
    /// not one of its players, or the velocity is not a finite number.
    pub fn apply_input(
        &self,
        room_id: &str,
        client_id: ClientId,
        velocity_y: f32,
        client_timestamp: Option<u64>,
        received_at: u64,
    ) -> Result<(), SessionError> {
        let room = self
            .lookup(room_id)
            .ok_or_else(|| SessionError::RoomNotFound(room_id.to_string()))?;
        let side = room
            .players
            .side_of(client_id)
            .ok_or(SessionError::InvalidInput("sender is not a player in this room"))?;
        if !velocity_y.is_finite() {
            return Err(SessionError::InvalidInput("paddle velocity is not finite"));
        }

        let latency_ms = client_timestamp.map(|sent| received_at.saturating_sub(sent));
        room.send(RoomCommand::SetPaddle {
            side,
            velocity_y,
            latency_ms,
        });
        Ok(())
    }

    /// Add a spectator. Resolves once the room has taken them in and sent
    /// `spectate:joined`; a room that stops first reports `RoomNotFound`.
    pub async fn add_spectator(&self, room_id: &str, client_id: ClientId) -> Result<(), SessionError> {
        let not_found = || SessionError::RoomNotFound(room_id.to_string());
        let room = self.lookup(room_id).filter(RoomHandle::is_active).ok_or_else(not_found)?;

        let (joined, ack) = oneshot::channel();
        if !room.send(RoomCommand::AddSpectator { client_id, joined }) {
            return Err(not_found());
        }
        ack.await.map_err(|_| not_found())?;

        // A terminate that already removed the room has also run its member cleanup
        self.remember(client_id, &room.id);
        if !self.rooms.contains_key(room_id) {
            self.forget(client_id, room_id);
        }
        Ok(())
    }

    pub fn cheer(&self, room_id: &str, from: ClientId) -> Result<(), SessionError> {
        let room = self
            .lookup(room_id)
            .ok_or_else(|| SessionError::RoomNotFound(room_id.to_string()))?;
        room.send(RoomCommand::Cheer(from));
        Ok(())
    }

    /// Rooms available to spectate, ordered by id
    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<RoomSummary> = self
            .rooms
            .iter()
            .map(|entry| RoomSummary {
                id: entry.key().clone(),
                player_count: Players::COUNT,
            })
            .collect();
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        rooms
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    /// Stop the room's tick loop, notify every member, then drop it from the index.
    /// Returns false if the room was unknown or is already being terminated.
    pub async fn terminate(&self, room_id: &str, reason: EndReason) -> bool {
        let Some(room) = self.lookup(room_id) else {
            return false;
        };
        let Some(members) = room.stop(reason).await else {
            return false;
        };

        self.rooms.remove(room_id);
        for client_id in members {
            self.forget(client_id, room_id);
        }

        info!(
            room_id = %room_id,
            reason = ?reason,
            active_rooms = self.rooms.len(),
            "Room terminated"
        );
        true
    }

    /// End every room the client plays in or watches
    pub async fn disconnect(&self, client_id: ClientId) -> usize {
        let Some((_, room_ids)) = self.memberships.remove(&client_id) else {
            return 0;
        };

        let mut ended = 0;
        for room_id in room_ids {
            if self.terminate(&room_id, EndReason::PlayerLeft).await {
                ended += 1;
            }
        }
        debug!(client_id = %client_id, rooms_ended = ended, "Disconnect cleanup done");
        ended
    }

    pub async fn terminate_all(&self, reason: EndReason) {
        let room_ids: Vec<RoomId> = self.rooms.iter().map(|entry| entry.key().clone()).collect();
        for room_id in room_ids {
            self.terminate(&room_id, reason).await;
        }
    }

    fn remember(&self, client_id: ClientId, room_id: &str) {
        self.memberships
            .entry(client_id)
            .or_default()
            .insert(room_id.to_string());
    }

    fn forget(&self, client_id: ClientId, room_id: &str) {
        let now_empty = match self.memberships.get_mut(&client_id) {
            Some(mut rooms) => {
                rooms.remove(room_id);
                rooms.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.memberships.remove_if(&client_id, |_, rooms| rooms.is_empty());
        }
    }
}

/// `room-<unix millis>-<random>`; callers retry on collision with a live room
fn generate_room_id() -> RoomId {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("room-{}-{}", unix_millis(), suffix)
}

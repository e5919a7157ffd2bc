//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::physics::{Ball, Paddles, Scores, Side};
use crate::game::ClientId;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Enter the matchmaking queue
    #[serde(rename = "queue:join")]
    QueueJoin,

    /// Leave the matchmaking queue
    #[serde(rename = "queue:leave")]
    QueueLeave,

    /// Ask for the list of rooms that can be spectated
    #[serde(rename = "spectate-list-request", alias = "spectate")]
    SpectateListRequest,

    /// Watch a running room
    #[serde(rename = "spectate:join")]
    SpectateJoin { room_id: String },

    /// Set the sender's paddle velocity
    #[serde(rename = "paddle:set")]
    PaddleSet {
        room_id: String,
        /// Units per tick, negative is up
        #[serde(alias = "vy")]
        vertical_velocity: f32,
        /// Client wall clock at send time (unix millis)
        #[serde(default, alias = "clientTime")]
        client_timestamp: Option<u64>,
    },

    /// Celebrate in a room
    #[serde(rename = "cheer")]
    Cheer { room_id: String },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Welcome message after connection
    #[serde(rename = "welcome")]
    Welcome { client_id: ClientId, server_time: u64 },

    /// Queue length, sent to the client that just joined
    #[serde(rename = "queue:status")]
    QueueStatus { waiting: usize },

    /// Queue length, broadcast to everyone
    #[serde(rename = "queue:update")]
    QueueUpdate { waiting: usize },

    /// Match found; sent to each player with their own side
    #[serde(rename = "match:start")]
    MatchStart { room_id: String, side: Side },

    /// Rooms available to spectate
    #[serde(rename = "spectate:list")]
    SpectateList { rooms: Vec<RoomSummary> },

    /// Spectator accepted into a room
    #[serde(rename = "spectate:joined")]
    SpectateJoined { room_id: String },

    /// Authoritative state, once per tick
    #[serde(rename = "state:update")]
    StateUpdate(StateUpdate),

    /// Room terminated
    #[serde(rename = "match:end")]
    MatchEnd { reason: EndReason },

    /// Someone in the room cheered
    #[serde(rename = "cheer")]
    Cheer { from: ClientId },

    /// Error message
    #[serde(rename = "error")]
    Error { code: ErrorCode, message: String },
}

/// Room listing entry for spectators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub player_count: usize,
}

/// Compact match snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    /// Per-room sequence number, starts at 1
    pub seq: u64,
    pub paddles: Paddles,
    pub ball: Ball,
    pub scores: Scores,
    /// Server clock at emission (unix millis), for latency estimation only
    pub server_time: u64,
}

/// Why a room ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    /// A player or spectator disconnected
    PlayerLeft,
    /// The server is shutting down
    ServerShutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    RoomNotFound,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_paddle_input_with_legacy_field_names() {
        let msg: ClientMsg = serde_json::from_value(json!({
            "type": "paddle:set",
            "roomId": "room-1-2",
            "vy": -6.0,
            "clientTime": 99
        }))
        .unwrap();

        assert_eq!(
            msg,
            ClientMsg::PaddleSet {
                room_id: "room-1-2".into(),
                vertical_velocity: -6.0,
                client_timestamp: Some(99),
            }
        );
    }

    #[test]
    fn client_timestamp_is_optional() {
        let msg: ClientMsg = serde_json::from_value(json!({
            "type": "paddle:set",
            "roomId": "r",
            "verticalVelocity": 3.0
        }))
        .unwrap();

        assert!(matches!(msg, ClientMsg::PaddleSet { client_timestamp: None, .. }));
    }

    #[test]
    fn spectate_alias_maps_to_list_request() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"spectate"}"#).unwrap();
        assert_eq!(msg, ClientMsg::SpectateListRequest);
    }

    #[test]
    fn server_messages_use_wire_names() {
        let start = serde_json::to_value(ServerMsg::MatchStart {
            room_id: "room-1-2".into(),
            side: Side::Right,
        })
        .unwrap();
        assert_eq!(start, json!({"type": "match:start", "roomId": "room-1-2", "side": "right"}));

        let end = serde_json::to_value(ServerMsg::MatchEnd {
            reason: EndReason::PlayerLeft,
        })
        .unwrap();
        assert_eq!(end, json!({"type": "match:end", "reason": "player-left"}));
    }

    #[test]
    fn spectate_list_nests_rooms_under_a_key() {
        let list = serde_json::to_value(ServerMsg::SpectateList {
            rooms: vec![RoomSummary {
                id: "room-1-2".into(),
                player_count: 2,
            }],
        })
        .unwrap();
        assert_eq!(
            list,
            json!({"type": "spectate:list", "rooms": [{"id": "room-1-2", "playerCount": 2}]})
        );
    }

    #[test]
    fn state_update_is_flattened_under_its_tag() {
        let mut rng = <rand_chacha::ChaCha8Rng as rand::SeedableRng>::seed_from_u64(3);
        let state = crate::game::physics::PhysicsState::new(&mut rng);
        let update = crate::game::snapshot::SnapshotBuilder::default().build_at(&state, 42);

        let value = serde_json::to_value(ServerMsg::StateUpdate(update)).unwrap();
        assert_eq!(value["type"], "state:update");
        assert_eq!(value["serverTime"], 42);
        assert_eq!(value["seq"], 1);
        assert_eq!(value["paddles"]["left"]["h"], 90.0);
        assert!(value["ball"]["vx"].is_number());
        assert_eq!(value["scores"], json!({"left": 0, "right": 0}));
    }
}

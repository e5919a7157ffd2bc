//! Routing of parsed client messages to the matchmaker and room manager

use tracing::{debug, info};

use crate::app::AppState;
use crate::game::{ClientId, SessionError};
use crate::ws::connections::Outbound;
use crate::ws::protocol::{ClientMsg, ErrorCode, ServerMsg};

/// Handle one inbound message from `client_id`.
///
/// Failures never close the connection. Only a spectate join for an unknown room is
/// reported back to the client; other rejected requests are dropped.
pub async fn handle_client_msg(
    state: &AppState,
    client_id: ClientId,
    msg: ClientMsg,
    received_at: u64,
) {
    let result = match msg {
        ClientMsg::QueueJoin => {
            state.matchmaker.join(client_id).await;
            Ok(())
        }
        ClientMsg::QueueLeave => {
            state.matchmaker.leave(client_id).await;
            Ok(())
        }
        ClientMsg::SpectateListRequest => {
            let rooms = state.rooms.list_rooms();
            state
                .connections
                .send(client_id, &ServerMsg::SpectateList { rooms });
            Ok(())
        }
        ClientMsg::SpectateJoin { room_id } => {
            match state.rooms.add_spectator(&room_id, client_id).await {
                Err(SessionError::RoomNotFound(room_id)) => {
                    state.connections.send(
                        client_id,
                        &ServerMsg::Error {
                            code: ErrorCode::RoomNotFound,
                            message: format!("Room {} not found", room_id),
                        },
                    );
                    Ok(())
                }
                other => other,
            }
        }
        ClientMsg::PaddleSet {
            room_id,
            vertical_velocity,
            client_timestamp,
        } => state.rooms.apply_input(
            &room_id,
            client_id,
            vertical_velocity,
            client_timestamp,
            received_at,
        ),
        ClientMsg::Cheer { room_id } => state.rooms.cheer(&room_id, client_id),
    };

    if let Err(e) = result {
        debug!(client_id = %client_id, error = %e, "Dropped client request");
    }
}

/// Clean up after a closed connection: stop delivery, leave the queue, end every room
/// the client was part of.
pub async fn handle_disconnect(state: &AppState, client_id: ClientId) {
    state.connections.unregister(client_id);
    let was_queued = state.matchmaker.leave(client_id).await;
    let rooms_ended = state.rooms.disconnect(client_id).await;

    info!(
        client_id = %client_id,
        was_queued,
        rooms_ended,
        "Client disconnected"
    );
}

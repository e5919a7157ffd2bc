//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::ClientId;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::connections::{Outbound, OutboundReceiver};
use crate::ws::dispatch::{handle_client_msg, handle_disconnect};
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler. Connections are anonymous; each gets a fresh id.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let client_id: ClientId = Uuid::new_v4();
    info!(client_id = %client_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();

    // Register before anything can be sent to this client
    let outbound_rx = state.connections.register(client_id);
    state.connections.send(
        client_id,
        &ServerMsg::Welcome {
            client_id,
            server_time: unix_millis(),
        },
    );

    run_session(&state, client_id, ws_sink, ws_stream, outbound_rx).await;

    handle_disconnect(&state, client_id).await;

    info!(client_id = %client_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    state: &AppState,
    client_id: ClientId,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut outbound_rx: OutboundReceiver,
) {
    let rate_limiter = ConnectionRateLimiter::new(state.config.input_rate_limit);

    // Spawn writer task: outbound queue -> WebSocket
    let mut writer_handle = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = ws_sink.send(Message::Text(frame)).await {
                debug!(client_id = %client_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> matchmaker / rooms. Also ends when the writer does,
    // which happens once this client's outbound queue is cut off.
    loop {
        let result = tokio::select! {
            next = ws_stream.next() => match next {
                Some(result) => result,
                None => break,
            },
            _ = &mut writer_handle => {
                debug!(client_id = %client_id, "Outbound stream closed, ending session");
                break;
            }
        };

        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check() {
                    warn!(client_id = %client_id, "Rate limited inbound message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => {
                        handle_client_msg(state, client_id, client_msg, unix_millis()).await;
                    }
                    Err(e) => {
                        warn!(client_id = %client_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(client_id = %client_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(client_id = %client_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(client_id = %client_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

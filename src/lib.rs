//! Pong session server - authoritative two-player matches over WebSocket
//!
//! - Matchmaking: FIFO pairing of waiting clients
//! - Rooms: one tick loop per match, fanning snapshots out to players and spectators
//! - Prediction: client-side extrapolation of the latest snapshot

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod matchmaking;
pub mod predict;
pub mod util;
pub mod ws;

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::info;

use crate::app::AppState;
use crate::http::build_router;
use crate::ws::protocol::EndReason;

/// Time given to socket writers to flush `match:end` frames before the server exits
const SHUTDOWN_FLUSH: Duration = Duration::from_millis(200);

/// Serve HTTP and WebSocket traffic until `shutdown` resolves, then end every room
/// with `server-shutdown`.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let rooms = state.rooms.clone();
    let router = build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!(active_rooms = rooms.active_rooms(), "Ending all rooms");
            rooms.terminate_all(EndReason::ServerShutdown).await;
            tokio::time::sleep(SHUTDOWN_FLUSH).await;
        })
        .await?;

    Ok(())
}

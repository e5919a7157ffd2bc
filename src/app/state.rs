//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::{RoomManager, RoomSettings};
use crate::matchmaking::Matchmaker;
use crate::ws::connections::{ConnectionRegistry, Outbound};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub connections: Arc<ConnectionRegistry>,
    pub rooms: Arc<RoomManager>,
    pub matchmaker: Arc<Matchmaker>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Live sockets; also the send capability handed to the game core
        let connections = Arc::new(ConnectionRegistry::new());
        let outbound: Arc<dyn Outbound> = connections.clone();

        let rooms = Arc::new(RoomManager::new(
            RoomSettings::from_config(&config),
            outbound.clone(),
        ));

        let matchmaker = Arc::new(Matchmaker::new(rooms.clone(), outbound));

        Self {
            config,
            connections,
            rooms,
            matchmaker,
        }
    }
}

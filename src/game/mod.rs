//! Game simulation and room lifecycle

pub mod manager;
pub mod physics;
pub mod room;
pub mod snapshot;

pub use manager::{RoomManager, SessionError};
pub use room::{Players, RoomCommand, RoomHandle, RoomSettings};

use uuid::Uuid;

/// One connected participant, stable for the connection's lifetime
pub type ClientId = Uuid;

/// Room identifier, unique for the process lifetime
pub type RoomId = String;

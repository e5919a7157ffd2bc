//! Matchmaking: FIFO pairing of waiting clients

pub mod queue;
pub mod service;

pub use service::Matchmaker;

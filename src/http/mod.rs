//! HTTP surface: health check and WebSocket upgrade route

pub mod routes;

pub use routes::build_router;

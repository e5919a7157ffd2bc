//! Time utilities for the tick loop and latency estimation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Simulation rate the physics constants are tuned for
pub const SIMULATION_TPS: u32 = 60;

/// Wall-clock length of one tick at `tick_rate`
pub fn tick_duration(tick_rate: u32) -> Duration {
    Duration::from_micros(1_000_000 / u64::from(tick_rate.max(1)))
}

/// Milliseconds per tick at `tick_rate`
pub fn tick_millis(tick_rate: u32) -> f32 {
    1000.0 / tick_rate.max(1) as f32
}

/// Convert a millisecond span into fractional ticks
pub fn millis_to_ticks(millis: u64, tick_rate: u32) -> f32 {
    millis as f32 / tick_millis(tick_rate)
}

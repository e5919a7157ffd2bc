//! Client-side prediction over authoritative snapshots.
//!
//! The predictor never integrates its own output: every call to [`ClientPredictor::predict`]
//! starts again from the latest accepted snapshot, so error cannot build up between
//! snapshots. Results are display-only.

use crate::game::physics::FIELD_HEIGHT;
use crate::util::time::{millis_to_ticks, SIMULATION_TPS};
use crate::ws::protocol::StateUpdate;

/// Estimated one-way delay from the server's emission timestamp.
///
/// Half of the observed clock difference, never negative. A local clock running
/// behind the server's yields zero.
pub fn one_way_delay_ms(server_time: u64, local_now_ms: u64) -> f32 {
    local_now_ms.saturating_sub(server_time) as f32 / 2.0
}

/// Advance `snapshot` by the estimated one-way delay
pub fn extrapolate(
    snapshot: &StateUpdate,
    local_now_ms: u64,
    field_height: f32,
    tick_rate: u32,
) -> StateUpdate {
    let delay_ms = one_way_delay_ms(snapshot.server_time, local_now_ms);
    let ticks = millis_to_ticks(delay_ms.round() as u64, tick_rate);

    let mut predicted = *snapshot;
    predicted.paddles.left.advance(ticks, field_height);
    predicted.paddles.right.advance(ticks, field_height);
    predicted.ball.x += predicted.ball.velocity_x * ticks;
    predicted.ball.y += predicted.ball.velocity_y * ticks;
    predicted
}

/// Holds the newest authoritative snapshot and extrapolates it on demand
#[derive(Debug, Clone)]
pub struct ClientPredictor {
    field_height: f32,
    tick_rate: u32,
    latest: Option<StateUpdate>,
}

impl ClientPredictor {
    pub fn new(field_height: f32, tick_rate: u32) -> Self {
        Self {
            field_height,
            tick_rate,
            latest: None,
        }
    }

    /// Take a snapshot from the server. Returns false, leaving state untouched,
    /// if it is not newer than the one already held.
    pub fn accept(&mut self, snapshot: StateUpdate) -> bool {
        if let Some(latest) = &self.latest {
            if snapshot.seq <= latest.seq {
                return false;
            }
        }
        self.latest = Some(snapshot);
        true
    }

    pub fn latest(&self) -> Option<&StateUpdate> {
        self.latest.as_ref()
    }

    /// Display state for `local_now_ms`, or `None` before the first snapshot
    pub fn predict(&self, local_now_ms: u64) -> Option<StateUpdate> {
        self.latest
            .as_ref()
            .map(|snapshot| extrapolate(snapshot, local_now_ms, self.field_height, self.tick_rate))
    }

    /// Forget the held snapshot, e.g. when a new match starts
    pub fn reset(&mut self) {
        self.latest = None;
    }
}

impl Default for ClientPredictor {
    fn default() -> Self {
        Self::new(FIELD_HEIGHT, SIMULATION_TPS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::{Ball, Paddle, Paddles, Scores, Side, FIELD_WIDTH};

    fn snapshot(seq: u64, server_time: u64) -> StateUpdate {
        let mut left = Paddle::new(Side::Left, FIELD_WIDTH, FIELD_HEIGHT);
        left.velocity_y = 4.0;
        let mut right = Paddle::new(Side::Right, FIELD_WIDTH, FIELD_HEIGHT);
        right.velocity_y = -2.0;
        StateUpdate {
            seq,
            paddles: Paddles { left, right },
            ball: Ball {
                x: 400.0,
                y: 250.0,
                velocity_x: 5.0,
                velocity_y: -3.0,
                radius: 8.0,
            },
            scores: Scores::default(),
            server_time,
        }
    }

    #[test]
    fn clock_behind_server_means_no_delay() {
        assert_eq!(one_way_delay_ms(1_000, 900), 0.0);
        assert_eq!(one_way_delay_ms(1_000, 1_100), 50.0);

        let snap = snapshot(1, 1_000);
        assert_eq!(extrapolate(&snap, 900, FIELD_HEIGHT, SIMULATION_TPS), snap);
    }

    #[test]
    fn hundred_ms_round_trip_is_three_ticks_ahead() {
        let snap = snapshot(1, 10_000);
        let predicted = extrapolate(&snap, 10_100, FIELD_HEIGHT, SIMULATION_TPS);

        assert!((predicted.ball.x - 415.0).abs() < 1e-3);
        assert!((predicted.ball.y - 241.0).abs() < 1e-3);
        assert!((predicted.paddles.left.y - (snap.paddles.left.y + 12.0)).abs() < 1e-3);
        assert!((predicted.paddles.right.y - (snap.paddles.right.y - 6.0)).abs() < 1e-3);
        assert_eq!(predicted.seq, snap.seq);
    }

    #[test]
    fn predicted_paddles_stay_on_court() {
        let mut snap = snapshot(1, 0);
        snap.paddles.left.velocity_y = 1_000.0;
        snap.paddles.right.velocity_y = -1_000.0;

        let predicted = extrapolate(&snap, 2_000, FIELD_HEIGHT, SIMULATION_TPS);
        assert_eq!(predicted.paddles.left.y, FIELD_HEIGHT - snap.paddles.left.height);
        assert_eq!(predicted.paddles.right.y, 0.0);
    }

    #[test]
    fn stale_snapshots_are_ignored() {
        let mut predictor = ClientPredictor::default();
        assert!(predictor.predict(0).is_none());

        assert!(predictor.accept(snapshot(5, 1_000)));
        assert!(!predictor.accept(snapshot(5, 2_000)));
        assert!(!predictor.accept(snapshot(3, 3_000)));
        assert_eq!(predictor.latest().map(|s| s.server_time), Some(1_000));

        assert!(predictor.accept(snapshot(6, 4_000)));
        predictor.reset();
        assert!(predictor.latest().is_none());
        assert!(predictor.accept(snapshot(1, 0)));
    }

    #[test]
    fn prediction_always_starts_from_the_snapshot() {
        let mut predictor = ClientPredictor::default();
        predictor.accept(snapshot(1, 10_000));

        let first = predictor.predict(10_100).unwrap();
        let second = predictor.predict(10_100).unwrap();
        assert_eq!(first, second);

        // A new snapshot fully replaces the predicted state
        let mut next = snapshot(2, 10_100);
        next.ball.x = 100.0;
        predictor.accept(next);
        assert_eq!(predictor.predict(10_100).unwrap().ball.x, 100.0);
    }
}

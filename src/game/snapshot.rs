//! Snapshot building for the per-tick `state:update` fan-out

use crate::util::time::unix_millis;
use crate::ws::protocol::StateUpdate;

use super::physics::PhysicsState;

/// Builds snapshots for network transmission
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    /// Sequence number of the last snapshot built
    seq: u64,
}

impl SnapshotBuilder {
    /// Build the next snapshot, stamped with the current server time
    pub fn build(&mut self, state: &PhysicsState) -> StateUpdate {
        self.build_at(state, unix_millis())
    }

    pub fn build_at(&mut self, state: &PhysicsState, server_time: u64) -> StateUpdate {
        self.seq += 1;
        StateUpdate {
            seq: self.seq,
            paddles: state.paddles,
            ball: state.ball,
            scores: state.scores,
            server_time,
        }
    }

    pub fn last_seq(&self) -> u64 {
        self.seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn sequence_is_strictly_increasing() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut state = PhysicsState::new(&mut rng);
        let mut builder = SnapshotBuilder::default();

        let mut last = 0;
        for _ in 0..10 {
            state.step(&mut rng);
            let snapshot = builder.build(&state);
            assert!(snapshot.seq > last);
            last = snapshot.seq;
        }
        assert_eq!(builder.last_seq(), 10);
    }

    #[test]
    fn snapshot_copies_state_and_time() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let state = PhysicsState::new(&mut rng);
        let snapshot = SnapshotBuilder::default().build_at(&state, 1_234);

        assert_eq!(snapshot.server_time, 1_234);
        assert_eq!(snapshot.paddles, state.paddles);
        assert_eq!(snapshot.ball, state.ball);
        assert_eq!(snapshot.scores, state.scores);
    }
}

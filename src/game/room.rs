//! Room state and authoritative tick loop

use std::sync::Arc;

use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::util::time::{millis_to_ticks, tick_duration, SIMULATION_TPS};
use crate::ws::connections::Outbound;
use crate::ws::protocol::{EndReason, ServerMsg};

use super::physics::{PhysicsState, Side};
use super::snapshot::SnapshotBuilder;
use super::{ClientId, RoomId};

/// Per-room tuning shared by every room the manager creates
#[derive(Debug, Clone)]
pub struct RoomSettings {
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Cap on the one-off input latency nudge (0 disables it)
    pub lag_compensation_max_ms: u64,
    /// Capacity of the room's command queue
    pub command_capacity: usize,
}

impl RoomSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick_rate: config.tick_rate,
            lag_compensation_max_ms: config.lag_compensation_max_ms,
            ..Self::default()
        }
    }
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            tick_rate: SIMULATION_TPS,
            lag_compensation_max_ms: 100,
            command_capacity: 256,
        }
    }
}

/// The two players of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Players {
    pub left: ClientId,
    pub right: ClientId,
}

impl Players {
    pub const COUNT: usize = 2;

    pub fn side_of(&self, client_id: ClientId) -> Option<Side> {
        if client_id == self.left {
            Some(Side::Left)
        } else if client_id == self.right {
            Some(Side::Right)
        } else {
            None
        }
    }

    pub fn contains(&self, client_id: ClientId) -> bool {
        self.side_of(client_id).is_some()
    }

    pub fn to_vec(&self) -> Vec<ClientId> {
        vec![self.left, self.right]
    }
}

/// Requests serialized into a room's tick loop
#[derive(Debug)]
pub enum RoomCommand {
    /// New paddle velocity; `latency_ms` is the estimated one-way delay of the input
    SetPaddle {
        side: Side,
        velocity_y: f32,
        latency_ms: Option<u64>,
    },
    /// `joined` fires once the room has taken the spectator in. It is dropped unsent
    /// if the room stops first.
    AddSpectator {
        client_id: ClientId,
        joined: oneshot::Sender<()>,
    },
    Cheer(ClientId),
}

/// Stop signal and task handle; taken exactly once when the room is terminated
struct Lifecycle {
    stop_tx: oneshot::Sender<EndReason>,
    task: JoinHandle<Vec<ClientId>>,
}

/// Handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub id: RoomId,
    pub players: Players,
    command_tx: mpsc::Sender<RoomCommand>,
    lifecycle: Arc<Mutex<Option<Lifecycle>>>,
}

impl RoomHandle {
    /// Queue a command for the next tick. Returns false if the room is gone or saturated.
    pub fn send(&self, command: RoomCommand) -> bool {
        match self.command_tx.try_send(command) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(room_id = %self.id, "Room command queue full, dropping command");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// True until the room has been told to stop
    pub fn is_active(&self) -> bool {
        self.lifecycle.lock().is_some() && !self.command_tx.is_closed()
    }

    /// Stop the tick loop and wait for it to exit. The loop sends `match:end` to every
    /// member as its final act, so no snapshot can follow it.
    ///
    /// Returns the room's final member list, or `None` if the room was already stopped.
    pub async fn stop(&self, reason: EndReason) -> Option<Vec<ClientId>> {
        let Lifecycle { stop_tx, task } = self.lifecycle.lock().take()?;

        // Only fails if the task already exited; joining below still reaps it
        let _ = stop_tx.send(reason);

        match task.await {
            Ok(members) => Some(members),
            Err(e) => {
                warn!(room_id = %self.id, error = %e, "Room task did not exit cleanly");
                Some(self.players.to_vec())
            }
        }
    }
}

/// One match: owns its physics state and spectators, driven by its own tick task
pub struct Room {
    id: RoomId,
    players: Players,
    spectators: Vec<ClientId>,
    state: PhysicsState,
    rng: ChaCha8Rng,
    snapshots: SnapshotBuilder,
    command_rx: mpsc::Receiver<RoomCommand>,
    outbound: Arc<dyn Outbound>,
    settings: RoomSettings,
}

impl Room {
    /// Create the room and start its tick loop
    pub fn spawn(
        id: RoomId,
        players: Players,
        seed: u64,
        settings: RoomSettings,
        outbound: Arc<dyn Outbound>,
    ) -> RoomHandle {
        let (command_tx, command_rx) = mpsc::channel(settings.command_capacity.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let state = PhysicsState::new(&mut rng);

        let room = Self {
            id: id.clone(),
            players,
            spectators: Vec::new(),
            state,
            rng,
            snapshots: SnapshotBuilder::default(),
            command_rx,
            outbound,
            settings,
        };
        let task = tokio::spawn(room.run(stop_rx));

        RoomHandle {
            id,
            players,
            command_tx,
            lifecycle: Arc::new(Mutex::new(Some(Lifecycle { stop_tx, task }))),
        }
    }

    /// Run the authoritative tick loop until stopped
    async fn run(mut self, mut stop_rx: oneshot::Receiver<EndReason>) -> Vec<ClientId> {
        info!(room_id = %self.id, "Room tick loop started");

        let mut ticker = interval(tick_duration(self.settings.tick_rate));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let reason = loop {
            tokio::select! {
                biased;
                // A dropped sender means every handle is gone: stop without notifying
                reason = &mut stop_rx => break reason.ok(),
                _ = ticker.tick() => self.tick(),
            }
        };

        let members = self.members();
        if let Some(reason) = reason {
            self.outbound.send_many(&members, &ServerMsg::MatchEnd { reason });
        }

        info!(
            room_id = %self.id,
            ticks = self.snapshots.last_seq(),
            left_score = self.state.scores.left,
            right_score = self.state.scores.right,
            "Room tick loop stopped"
        );
        members
    }

    /// Drain commands, advance one step, fan out the snapshot
    fn tick(&mut self) {
        self.process_commands();

        if let Some(scorer) = self.state.step(&mut self.rng) {
            debug!(
                room_id = %self.id,
                scorer = %scorer,
                left = self.state.scores.left,
                right = self.state.scores.right,
                "Point scored"
            );
        }

        let snapshot = self.snapshots.build(&self.state);
        self.outbound
            .send_many(&self.members(), &ServerMsg::StateUpdate(snapshot));
    }

    fn process_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            match command {
                RoomCommand::SetPaddle {
                    side,
                    velocity_y,
                    latency_ms,
                } => self.handle_paddle(side, velocity_y, latency_ms),
                RoomCommand::AddSpectator { client_id, joined } => {
                    self.handle_spectator(client_id);
                    let _ = joined.send(());
                }
                RoomCommand::Cheer(from) => {
                    self.outbound
                        .send_many(&self.members(), &ServerMsg::Cheer { from });
                }
            }
        }
    }

    fn handle_paddle(&mut self, side: Side, velocity_y: f32, latency_ms: Option<u64>) {
        self.state.set_paddle_velocity(side, velocity_y);

        // Catch the paddle up for the time the input spent in flight
        let cap = self.settings.lag_compensation_max_ms;
        if let Some(latency) = latency_ms.filter(|_| cap > 0) {
            let ticks = millis_to_ticks(latency.min(cap), self.settings.tick_rate);
            self.state.nudge_paddle(side, ticks);
        }
    }

    fn handle_spectator(&mut self, client_id: ClientId) {
        if !self.players.contains(client_id) && !self.spectators.contains(&client_id) {
            self.spectators.push(client_id);
            info!(
                room_id = %self.id,
                client_id = %client_id,
                spectators = self.spectators.len(),
                "Spectator joined room"
            );
        }
        self.outbound.send(
            client_id,
            &ServerMsg::SpectateJoined {
                room_id: self.id.clone(),
            },
        );
    }

    /// Players first, then spectators in join order
    fn members(&self) -> Vec<ClientId> {
        let mut members = Vec::with_capacity(2 + self.spectators.len());
        members.push(self.players.left);
        members.push(self.players.right);
        members.extend(self.spectators.iter().copied());
        members
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connections::recording::RecordingOutbound;
    use crate::ws::protocol::StateUpdate;
    use std::time::Duration;
    use uuid::Uuid;

    fn updates(msgs: &[ServerMsg]) -> Vec<StateUpdate> {
        msgs.iter()
            .filter_map(|m| match m {
                ServerMsg::StateUpdate(update) => Some(*update),
                _ => None,
            })
            .collect()
    }

    fn spawn_room(outbound: &Arc<RecordingOutbound>, settings: RoomSettings) -> RoomHandle {
        let players = Players {
            left: Uuid::new_v4(),
            right: Uuid::new_v4(),
        };
        Room::spawn("room-test-1".into(), players, 11, settings, outbound.clone())
    }

    #[tokio::test]
    async fn ticks_fan_out_snapshots_to_both_players() {
        let outbound = Arc::new(RecordingOutbound::new());
        let room = spawn_room(&outbound, RoomSettings::default());

        tokio::time::sleep(Duration::from_millis(120)).await;
        room.stop(EndReason::ServerShutdown).await;

        let left = updates(&outbound.messages_for(room.players.left));
        let right = updates(&outbound.messages_for(room.players.right));
        assert!(left.len() >= 3, "only {} snapshots", left.len());
        assert_eq!(left, right);
        assert!(left.windows(2).all(|w| w[1].seq == w[0].seq + 1));
    }

    #[tokio::test]
    async fn paddle_input_is_last_write_wins() {
        let outbound = Arc::new(RecordingOutbound::new());
        let room = spawn_room(&outbound, RoomSettings::default());

        for velocity_y in [2.0, -4.0, 6.0] {
            assert!(room.send(RoomCommand::SetPaddle {
                side: Side::Left,
                velocity_y,
                latency_ms: None,
            }));
        }
        tokio::time::sleep(Duration::from_millis(80)).await;
        room.stop(EndReason::ServerShutdown).await;

        let last = *updates(&outbound.messages_for(room.players.left)).last().unwrap();
        assert_eq!(last.paddles.left.velocity_y, 6.0);
        assert_eq!(last.paddles.right.velocity_y, 0.0);
    }

    #[tokio::test]
    async fn latency_nudge_moves_the_paddle_once() {
        let outbound = Arc::new(RecordingOutbound::new());
        let settings = RoomSettings {
            lag_compensation_max_ms: 50,
            ..RoomSettings::default()
        };
        let room = spawn_room(&outbound, settings);

        // Let one snapshot through so we know the starting position
        tokio::time::sleep(Duration::from_millis(40)).await;
        let before = *updates(&outbound.messages_for(room.players.left)).last().unwrap();

        // 10 s of claimed latency is capped to 50 ms, i.e. 3 ticks
        room.send(RoomCommand::SetPaddle {
            side: Side::Right,
            velocity_y: 2.0,
            latency_ms: Some(10_000),
        });
        tokio::time::sleep(Duration::from_millis(40)).await;
        room.stop(EndReason::ServerShutdown).await;

        let after = updates(&outbound.messages_for(room.players.left));
        let first_moved = after
            .iter()
            .find(|u| u.seq > before.seq && u.paddles.right.velocity_y == 2.0)
            .unwrap();
        // Nudge of 3 ticks plus the regular step of the same tick
        let moved = first_moved.paddles.right.y - before.paddles.right.y;
        assert!((moved - 8.0).abs() < 1e-3, "moved {moved}");
    }

    #[tokio::test]
    async fn stop_sends_one_match_end_after_the_last_snapshot() {
        let outbound = Arc::new(RecordingOutbound::new());
        let room = spawn_room(&outbound, RoomSettings::default());
        let spectator = Uuid::new_v4();
        let (joined, _ack) = oneshot::channel();
        room.send(RoomCommand::AddSpectator {
            client_id: spectator,
            joined,
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        let members = room.stop(EndReason::PlayerLeft).await.unwrap();
        assert_eq!(members, vec![room.players.left, room.players.right, spectator]);
        assert!(room.stop(EndReason::PlayerLeft).await.is_none());
        assert!(!room.is_active());

        tokio::time::sleep(Duration::from_millis(60)).await;
        for member in members {
            let msgs = outbound.messages_for(member);
            let ends: Vec<_> = msgs
                .iter()
                .filter(|m| matches!(m, ServerMsg::MatchEnd { .. }))
                .collect();
            assert_eq!(ends, vec![&ServerMsg::MatchEnd { reason: EndReason::PlayerLeft }]);
            assert!(matches!(msgs.last(), Some(ServerMsg::MatchEnd { .. })));
        }
    }

    #[tokio::test]
    async fn spectator_and_cheer_reach_every_member() {
        let outbound = Arc::new(RecordingOutbound::new());
        let room = spawn_room(&outbound, RoomSettings::default());
        let spectator = Uuid::new_v4();

        let mut acks = Vec::new();
        for _ in 0..2 {
            let (joined, ack) = oneshot::channel();
            room.send(RoomCommand::AddSpectator {
                client_id: spectator,
                joined,
            });
            acks.push(ack);
        }
        room.send(RoomCommand::Cheer(spectator));
        for ack in acks {
            assert!(ack.await.is_ok());
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        room.stop(EndReason::ServerShutdown).await;

        let seen = outbound.messages_for(spectator);
        assert!(matches!(seen.first(), Some(ServerMsg::SpectateJoined { .. })));
        assert!(!updates(&seen).is_empty());
        for member in [room.players.left, room.players.right, spectator] {
            let cheers = outbound
                .messages_for(member)
                .into_iter()
                .filter(|m| *m == ServerMsg::Cheer { from: spectator })
                .count();
            assert_eq!(cheers, 1);
        }
    }

    #[tokio::test]
    async fn join_queued_behind_a_stop_is_never_acknowledged() {
        let outbound = Arc::new(RecordingOutbound::new());
        let room = spawn_room(&outbound, RoomSettings::default());
        let spectator = Uuid::new_v4();

        // Queue the join and stop before the room gets a chance to tick again
        let (joined, ack) = oneshot::channel();
        assert!(room.send(RoomCommand::AddSpectator {
            client_id: spectator,
            joined,
        }));
        let members = room.stop(EndReason::PlayerLeft).await.unwrap();

        assert!(ack.await.is_err());
        assert!(!members.contains(&spectator));
        assert!(outbound.messages_for(spectator).is_empty());
    }
}

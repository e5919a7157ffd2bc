//! Per-connection outbound queues and the send capability the game core uses

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{error, warn};

use crate::game::ClientId;
use crate::ws::protocol::ServerMsg;

/// Snapshots kept per connection. Past this the oldest queued snapshot is dropped,
/// so a lagging client skips ahead instead of replaying stale state.
pub const SNAPSHOT_BACKLOG: usize = 32;

/// Control frames (everything but `state:update`) a connection may have pending.
/// A client this far behind has stopped reading and is cut off.
pub const CONTROL_BACKLOG: usize = 1024;

/// Delivery of server messages to connected clients.
///
/// Every method is fire-and-forget: implementations must never block the caller,
/// which is usually a room's tick loop.
pub trait Outbound: Send + Sync {
    /// Send to a single client
    fn send(&self, to: ClientId, msg: &ServerMsg);

    /// Send the same message to several clients
    fn send_many(&self, to: &[ClientId], msg: &ServerMsg) {
        for client_id in to {
            self.send(*client_id, msg);
        }
    }

    /// Send to every connected client
    fn broadcast(&self, msg: &ServerMsg);
}

struct Frame {
    text: Arc<str>,
    /// Snapshots may be dropped under backpressure, control frames never are
    lossy: bool,
}

#[derive(Default)]
struct Pending {
    frames: VecDeque<Frame>,
    snapshots: usize,
    closed: bool,
}

enum Next {
    Frame(String),
    Empty,
    Closed,
}

/// One connection's ordered outbound queue
#[derive(Default)]
struct Outlet {
    pending: Mutex<Pending>,
    ready: Notify,
}

impl Outlet {
    /// Queue a frame. Returns false if the connection had to be cut off.
    fn push(&self, text: Arc<str>, lossy: bool, snapshot_backlog: usize) -> bool {
        let mut pending = self.pending.lock();
        if pending.closed {
            return true;
        }

        if lossy {
            if pending.snapshots >= snapshot_backlog {
                if let Some(pos) = pending.frames.iter().position(|f| f.lossy) {
                    pending.frames.remove(pos);
                    pending.snapshots -= 1;
                }
            }
            pending.snapshots += 1;
        } else if pending.frames.len() - pending.snapshots >= CONTROL_BACKLOG {
            pending.frames.clear();
            pending.snapshots = 0;
            pending.closed = true;
            drop(pending);
            self.ready.notify_one();
            return false;
        }

        pending.frames.push_back(Frame { text, lossy });
        drop(pending);
        self.ready.notify_one();
        true
    }

    fn pop(&self) -> Next {
        let mut pending = self.pending.lock();
        match pending.frames.pop_front() {
            Some(frame) => {
                if frame.lossy {
                    pending.snapshots -= 1;
                }
                Next::Frame(frame.text.to_string())
            }
            None if pending.closed => Next::Closed,
            None => Next::Empty,
        }
    }

    fn close(&self) {
        self.pending.lock().closed = true;
        self.ready.notify_one();
    }
}

/// Reading end of a connection's queue, owned by its socket writer
pub struct OutboundReceiver {
    outlet: Arc<Outlet>,
}

impl OutboundReceiver {
    /// Next frame in send order, or `None` once the connection is closed and drained
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            match self.outlet.pop() {
                Next::Frame(frame) => return Some(frame),
                Next::Closed => return None,
                Next::Empty => self.outlet.ready.notified().await,
            }
        }
    }

    /// Next frame if one is already queued
    pub fn try_recv(&mut self) -> Option<String> {
        match self.outlet.pop() {
            Next::Frame(frame) => Some(frame),
            Next::Empty | Next::Closed => None,
        }
    }
}

impl Drop for OutboundReceiver {
    fn drop(&mut self) {
        self.outlet.close();
    }
}

/// Registry of live WebSocket connections
pub struct ConnectionRegistry {
    connections: DashMap<ClientId, Arc<Outlet>>,
    snapshot_backlog: usize,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::with_snapshot_backlog(SNAPSHOT_BACKLOG)
    }

    pub fn with_snapshot_backlog(snapshot_backlog: usize) -> Self {
        Self {
            connections: DashMap::new(),
            snapshot_backlog: snapshot_backlog.max(1),
        }
    }

    /// Register a connection; the receiver yields serialized frames for its socket
    pub fn register(&self, client_id: ClientId) -> OutboundReceiver {
        let outlet = Arc::new(Outlet::default());
        self.connections.insert(client_id, outlet.clone());
        OutboundReceiver { outlet }
    }

    /// Stop delivery; the receiver ends once it has drained what is already queued
    pub fn unregister(&self, client_id: ClientId) {
        if let Some((_, outlet)) = self.connections.remove(&client_id) {
            outlet.close();
        }
    }

    pub fn is_connected(&self, client_id: &ClientId) -> bool {
        self.connections.contains_key(client_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn deliver(&self, client_id: ClientId, frame: &Arc<str>, lossy: bool) {
        let Some(outlet) = self.connections.get(&client_id).map(|o| o.value().clone()) else {
            return;
        };
        if !outlet.push(frame.clone(), lossy, self.snapshot_backlog) {
            warn!(client_id = %client_id, "Client stopped reading, closing its connection");
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Outbound for ConnectionRegistry {
    fn send(&self, to: ClientId, msg: &ServerMsg) {
        if let Some((frame, lossy)) = encode(msg) {
            self.deliver(to, &frame, lossy);
        }
    }

    fn send_many(&self, to: &[ClientId], msg: &ServerMsg) {
        // Serialize once per fan-out
        if let Some((frame, lossy)) = encode(msg) {
            for client_id in to {
                self.deliver(*client_id, &frame, lossy);
            }
        }
    }

    fn broadcast(&self, msg: &ServerMsg) {
        let Some((frame, lossy)) = encode(msg) else {
            return;
        };
        let recipients: Vec<ClientId> = self.connections.iter().map(|entry| *entry.key()).collect();
        for client_id in recipients {
            self.deliver(client_id, &frame, lossy);
        }
    }
}

/// Serialized frame plus whether it may be dropped under backpressure
fn encode(msg: &ServerMsg) -> Option<(Arc<str>, bool)> {
    let lossy = matches!(msg, ServerMsg::StateUpdate(_));
    serde_json::to_string(msg)
        .map(|text| (Arc::from(text), lossy))
        .map_err(|e| error!(error = %e, "Failed to serialize server message"))
        .ok()
}

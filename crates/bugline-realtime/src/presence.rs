//! Live-session presence tracking.
//!
//! One [`PresenceTracker`] holds the process-local session table: which
//! connections are alive, which rooms each has joined, and the per-connection
//! delivery channel. Membership is derived purely from live sessions — rooms
//! with zero members simply don't exist, and nothing here is persisted. The
//! table is rebuilt from scratch on restart.
//!
//! Session lifecycle: `Disconnected -> connect -> (join_room | leave_room |
//! touch)* -> disconnect`. A session silent for longer than the configured
//! heartbeat timeout is swept and treated exactly like a disconnect.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use bugline_core::defaults;
use bugline_core::{Clock, Error, EventPayload, PresenceUser, Result, Room, RoomEvent};

/// Configuration for the presence tracker.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Heartbeat silence after which a session is treated as disconnected.
    pub heartbeat_timeout: Duration,
    /// Interval between sweeps of the session table.
    pub sweep_interval: Duration,
    /// Buffered events per connection; deliveries beyond this are dropped.
    pub connection_buffer: usize,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(defaults::PRESENCE_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(defaults::PRESENCE_SWEEP_INTERVAL_SECS),
            connection_buffer: defaults::CONNECTION_BUFFER_SIZE,
        }
    }
}

impl PresenceConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `PRESENCE_TIMEOUT_SECS` | `60` | Heartbeat timeout |
    /// | `PRESENCE_SWEEP_INTERVAL_SECS` | `15` | Sweep interval |
    /// | `CONNECTION_BUFFER_SIZE` | `256` | Per-connection event buffer |
    pub fn from_env() -> Self {
        let heartbeat_timeout = std::env::var("PRESENCE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::PRESENCE_TIMEOUT_SECS);
        let sweep_interval = std::env::var("PRESENCE_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::PRESENCE_SWEEP_INTERVAL_SECS);
        let connection_buffer = std::env::var("CONNECTION_BUFFER_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::CONNECTION_BUFFER_SIZE)
            .max(1);

        Self {
            heartbeat_timeout: Duration::from_secs(heartbeat_timeout),
            sweep_interval: Duration::from_secs(sweep_interval),
            connection_buffer,
        }
    }

    /// Set the heartbeat timeout.
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

struct Session {
    subject: PresenceUser,
    sender: mpsc::Sender<RoomEvent>,
    rooms: HashSet<Room>,
    last_seen: DateTime<Utc>,
}

#[derive(Default)]
struct PresenceState {
    sessions: HashMap<Uuid, Session>,
    /// Room → live session ids. Derived index; kept in lockstep with the
    /// per-session room sets.
    rooms: HashMap<Room, HashSet<Uuid>>,
}

/// Process-local registry of live connections and their room memberships.
///
/// All membership changes and deliveries happen under one mutex, which is
/// what makes broadcast ordering and cleanup deterministic: events enqueue
/// onto the per-connection channels in the order the calls are issued.
/// No lock is held across an await — delivery is non-blocking `try_send`.
pub struct PresenceTracker {
    config: PresenceConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<PresenceState>,
}

impl PresenceTracker {
    pub fn new(config: PresenceConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(PresenceState::default()),
        }
    }

    /// Register a new live connection for `subject`.
    ///
    /// Returns the session id and the receiving half of the connection's
    /// event channel. The session starts with no rooms.
    pub fn connect(&self, subject: PresenceUser) -> (Uuid, mpsc::Receiver<RoomEvent>) {
        let (tx, rx) = mpsc::channel(self.config.connection_buffer);
        let session_id = Uuid::now_v7();
        let mut state = self.state.lock().expect("presence lock poisoned");
        state.sessions.insert(
            session_id,
            Session {
                subject: subject.clone(),
                sender: tx,
                rooms: HashSet::new(),
                last_seen: self.clock.now(),
            },
        );
        info!(
            subsystem = "presence",
            op = "connect",
            session_id = %session_id,
            subject_id = %subject.subject_id,
            "session connected"
        );
        (session_id, rx)
    }

    /// Join `room`: the joiner receives the full current member list, every
    /// other member receives a `presence:user_joined` delta.
    ///
    /// Joining a room the session is already in is a no-op.
    pub fn join_room(&self, session_id: Uuid, room: Room) -> Result<()> {
        let mut state = self.state.lock().expect("presence lock poisoned");

        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| Error::NotFound(format!("presence session {session_id}")))?;
        if !session.rooms.insert(room) {
            return Ok(());
        }
        let subject = session.subject.clone();
        let joiner_sender = session.sender.clone();

        let members = state.rooms.entry(room).or_default();
        let existing: Vec<Uuid> = members.iter().copied().collect();
        members.insert(session_id);

        // Full member list to the joiner (everyone already there).
        let users: Vec<PresenceUser> = existing
            .iter()
            .filter_map(|id| state.sessions.get(id))
            .map(|s| s.subject.clone())
            .collect();
        let snapshot = RoomEvent::new(room, None, EventPayload::PresenceUsers { users });
        Self::try_deliver(&joiner_sender, session_id, snapshot);

        // Delta to everyone else.
        let joined = RoomEvent::new(
            room,
            Some(subject.subject_id),
            EventPayload::PresenceUserJoined { user: subject },
        );
        for id in existing {
            if let Some(other) = state.sessions.get(&id) {
                Self::try_deliver(&other.sender, id, joined.clone());
            }
        }

        debug!(
            subsystem = "presence",
            op = "join_room",
            session_id = %session_id,
            room = %room,
            "session joined room"
        );
        Ok(())
    }

    /// Leave `room`, notifying the remaining members.
    pub fn leave_room(&self, session_id: Uuid, room: Room) -> Result<()> {
        let mut state = self.state.lock().expect("presence lock poisoned");
        self.leave_room_locked(&mut state, session_id, room)
    }

    /// Refresh the session's heartbeat.
    pub fn touch(&self, session_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().expect("presence lock poisoned");
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| Error::NotFound(format!("presence session {session_id}")))?;
        session.last_seen = self.clock.now();
        Ok(())
    }

    /// Tear down a session: leave every joined room (emitting
    /// `presence:user_left` to each), then discard the session.
    pub fn disconnect(&self, session_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().expect("presence lock poisoned");
        self.disconnect_locked(&mut state, session_id)
    }

    /// Disconnect every session whose heartbeat is older than the timeout.
    /// Returns the swept session ids.
    ///
    /// Collection and teardown happen under one guard, so a heartbeat that
    /// arrives concurrently either refreshes the session before the sweep
    /// examines it or finds the session already gone.
    pub fn sweep(&self) -> Vec<Uuid> {
        let cutoff = self.clock.now()
            - chrono::Duration::from_std(self.config.heartbeat_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let mut state = self.state.lock().expect("presence lock poisoned");
        let expired: Vec<Uuid> = state
            .sessions
            .iter()
            .filter(|(_, s)| s.last_seen < cutoff)
            .map(|(id, _)| *id)
            .collect();
        for session_id in &expired {
            warn!(
                subsystem = "presence",
                op = "sweep",
                session_id = %session_id,
                "session timed out, disconnecting"
            );
            let _ = self.disconnect_locked(&mut state, *session_id);
        }
        expired
    }

    /// Current members of a room.
    pub fn members(&self, room: Room) -> Vec<PresenceUser> {
        let state = self.state.lock().expect("presence lock poisoned");
        state
            .rooms
            .get(&room)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.sessions.get(id))
                    .map(|s| s.subject.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Deliver an event to every session currently joined to its room.
    ///
    /// Runs under the registry lock so concurrent deliveries to the same
    /// room enqueue in a single global order. Returns how many connections
    /// the event was handed to.
    pub(crate) fn deliver(&self, event: &RoomEvent) -> usize {
        let state = self.state.lock().expect("presence lock poisoned");
        let Some(members) = state.rooms.get(&event.room) else {
            return 0;
        };
        let mut delivered = 0;
        for id in members {
            if let Some(session) = state.sessions.get(id) {
                if Self::try_deliver(&session.sender, *id, event.clone()) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    fn disconnect_locked(&self, state: &mut PresenceState, session_id: Uuid) -> Result<()> {
        let rooms: Vec<Room> = match state.sessions.get(&session_id) {
            Some(session) => session.rooms.iter().copied().collect(),
            None => return Err(Error::NotFound(format!("presence session {session_id}"))),
        };
        for room in rooms {
            // Session is known to exist; leave cannot fail here.
            let _ = self.leave_room_locked(state, session_id, room);
        }
        state.sessions.remove(&session_id);
        info!(
            subsystem = "presence",
            op = "disconnect",
            session_id = %session_id,
            "session disconnected"
        );
        Ok(())
    }

    fn leave_room_locked(
        &self,
        state: &mut PresenceState,
        session_id: Uuid,
        room: Room,
    ) -> Result<()> {
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| Error::NotFound(format!("presence session {session_id}")))?;
        if !session.rooms.remove(&room) {
            return Ok(());
        }
        let subject = session.subject.clone();

        let remaining: Vec<Uuid> = match state.rooms.get_mut(&room) {
            Some(members) => {
                members.remove(&session_id);
                if members.is_empty() {
                    // Empty rooms are not retained.
                    state.rooms.remove(&room);
                    Vec::new()
                } else {
                    members.iter().copied().collect()
                }
            }
            None => Vec::new(),
        };

        let left = RoomEvent::new(
            room,
            Some(subject.subject_id),
            EventPayload::PresenceUserLeft { user: subject },
        );
        for id in remaining {
            if let Some(other) = state.sessions.get(&id) {
                Self::try_deliver(&other.sender, id, left.clone());
            }
        }

        debug!(
            subsystem = "presence",
            op = "leave_room",
            session_id = %session_id,
            room = %room,
            "session left room"
        );
        Ok(())
    }

    /// Fire-and-forget enqueue onto one connection. A full or closed
    /// channel never blocks or fails delivery to other connections.
    fn try_deliver(sender: &mpsc::Sender<RoomEvent>, session_id: Uuid, event: RoomEvent) -> bool {
        match sender.try_send(event) {
            Ok(()) => true,
            Err(err) => {
                trace!(
                    subsystem = "presence",
                    session_id = %session_id,
                    error = %err,
                    "dropped event for slow or closed connection"
                );
                false
            }
        }
    }
}

// ============================================================================
// Sweeper task
// ============================================================================

/// Handle for the background heartbeat sweeper.
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.handle.await;
    }
}

/// Spawn the periodic sweep of timed-out sessions.
pub fn spawn_sweeper(tracker: Arc<PresenceTracker>) -> SweeperHandle {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
    let interval = tracker.config.sweep_interval;
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            subsystem = "presence",
            op = "sweep",
            interval_secs = interval.as_secs(),
            "presence sweeper started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let swept = tracker.sweep();
                    if !swept.is_empty() {
                        debug!(
                            subsystem = "presence",
                            op = "sweep",
                            swept = swept.len(),
                            "swept timed-out sessions"
                        );
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!(subsystem = "presence", op = "sweep", "presence sweeper stopped");
                    break;
                }
            }
        }
    });
    SweeperHandle {
        shutdown_tx,
        handle,
    }
}

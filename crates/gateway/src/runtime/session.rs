//! Session Registry and per-session control surface (§2 component 12 support;
//! §4.4 Interactive Protocol; §4.5 Event Bus).
//!
//! Adapted from the run-tracking pattern used elsewhere in this codebase:
//! instead of a bounded ring that evicts old entries, sessions are long-lived
//! and explicitly started/ended by the operator, so the registry here is a
//! flat map keyed by `session_id` with no eviction. The per-entity
//! `broadcast::Sender` idea transfers directly -- each session owns one event
//! bus, and any number of observers may subscribe to it (§4.5, §5).
//!
//! The generation loop (see `generation_loop.rs`) is the sole writer of
//! session state and the session log (§5 "single-writer"). Every operator
//! action that needs to touch that state -- pause, resume, submit a human
//! turn, invoke, inject, continue, end -- is sent as a [`ControlMessage`] over
//! an mpsc channel and applied by the loop itself; handlers here never
//! mutate the log or history directly.

use std::collections::HashMap;
use std::sync::Arc;

use circle_domain::model::{Event, SessionState, TurnRecord};
use circle_domain::{Error, Result};
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Capacity of each session's event bus (§4.5: bounded FIFO; producers block
/// when full rather than drop).
pub const EVENT_BUS_CAPACITY_DEFAULT: usize = 256;

/// Capacity of a session's control-message channel. Control operations are
/// infrequent operator actions, so a small buffer is enough.
const CONTROL_CHANNEL_CAPACITY: usize = 32;

/// One operator-facing action (§4.4), applied by the generation loop task
/// that owns the session's state and log. `SubmitHuman` and `End` carry a
/// reply channel because their callers need a return value; the rest are
/// fire-and-forget signals.
pub enum ControlMessage {
    Pause,
    Resume,
    SubmitHuman(String, oneshot::Sender<Result<TurnRecord>>),
    Invoke(String),
    Inject(String),
    Continue,
    End(oneshot::Sender<String>),
}

/// The per-session runtime value owning that session's generation-loop task
/// handle, Event Bus sender, and a snapshot of its current state for cheap
/// reads from API handlers that do not need to go through the control
/// channel (e.g. `GET /session/<id>/state`).
pub struct SessionHandle {
    session_id: String,
    events_tx: broadcast::Sender<Event>,
    control_tx: mpsc::Sender<ControlMessage>,
    state: RwLock<SessionState>,
    task: RwLock<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    pub fn new(session_id: String, event_bus_capacity: usize) -> (Arc<Self>, mpsc::Receiver<ControlMessage>) {
        let (events_tx, _) = broadcast::channel(event_bus_capacity.max(1));
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let handle = Arc::new(Self {
            session_id,
            events_tx,
            control_tx,
            state: RwLock::new(SessionState::Idle),
            task: RwLock::new(None),
        });
        (handle, control_rx)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Called by the generation loop as its own state transitions; never
    /// called by an API handler directly (§5 single-writer).
    pub fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    pub fn attach_task(&self, task: JoinHandle<()>) {
        *self.task.write() = Some(task);
    }

    /// Publishes an event to every current subscriber. A send with no
    /// subscribers is not an error (§4.5: the bus outlives any one
    /// consumer); `broadcast::Sender::send` only fails that way.
    pub fn publish(&self, event: Event) {
        let _ = self.events_tx.send(event);
    }

    /// Subscribes a new observer to this session's event bus (§4.5, §6.2).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }

    fn is_complete(&self) -> bool {
        self.state() == SessionState::Complete
    }

    /// §4.4 `pause()` / `resume()` / `invoke()` / `inject()` / `continue()`:
    /// fire-and-forget signals to the loop. All operations are no-ops once
    /// the session is `Complete` (§4.4 idempotency note).
    pub async fn pause(&self) {
        if self.is_complete() {
            return;
        }
        let _ = self.control_tx.send(ControlMessage::Pause).await;
    }

    pub async fn resume(&self) {
        if self.is_complete() {
            return;
        }
        let _ = self.control_tx.send(ControlMessage::Resume).await;
    }

    pub async fn invoke(&self, agent_id: String) {
        if self.is_complete() {
            return;
        }
        let _ = self.control_tx.send(ControlMessage::Invoke(agent_id)).await;
    }

    pub async fn inject(&self, text: String) {
        if self.is_complete() {
            return;
        }
        let _ = self.control_tx.send(ControlMessage::Inject(text)).await;
    }

    pub async fn continue_(&self) {
        if self.is_complete() {
            return;
        }
        let _ = self.control_tx.send(ControlMessage::Continue).await;
    }

    /// §4.4 `submit_human(text)`: valid from any non-Complete state. Waits
    /// for the loop to append the turn and reply with the resulting record.
    pub async fn submit_human(&self, text: String) -> Result<TurnRecord> {
        if self.is_complete() {
            return Err(Error::InvalidTransition {
                from: "Complete".to_string(),
                op: "submit_human".to_string(),
            });
        }
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(ControlMessage::SubmitHuman(text, tx))
            .await
            .map_err(|_| Error::UnknownSession(self.session_id.clone()))?;
        rx.await.map_err(|_| Error::UnknownSession(self.session_id.clone()))?
    }

    /// §4.4 `end()`: idempotent -- a session already `Complete` returns its
    /// final path immediately without round-tripping the control channel.
    pub async fn end(&self) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        if self
            .control_tx
            .send(ControlMessage::End(tx))
            .await
            .is_err()
        {
            return Err(Error::UnknownSession(self.session_id.clone()));
        }
        rx.await.map_err(|_| Error::UnknownSession(self.session_id.clone()))
    }
}

/// Registry of all sessions known to this process (§2 component 12 support).
/// Unlike a ring of recent runs, sessions are never evicted here -- they are
/// explicitly started and ended by the operator, and a `Complete` session
/// remains queryable for the lifetime of the process.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, handle: Arc<SessionHandle>) {
        self.sessions
            .write()
            .insert(handle.session_id().to_string(), handle);
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn list(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        self.sessions
            .read()
            .values()
            .filter(|s| !s.is_complete())
            .count()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pause_and_resume_are_no_ops_once_complete() {
        let (handle, mut rx) = SessionHandle::new("s1".to_string(), 8);
        handle.set_state(SessionState::Complete);
        handle.pause().await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn registry_tracks_active_count() {
        let registry = SessionRegistry::new();
        let (h1, _rx1) = SessionHandle::new("a".to_string(), 8);
        let (h2, _rx2) = SessionHandle::new("b".to_string(), 8);
        h2.set_state(SessionState::Complete);
        registry.insert(h1);
        registry.insert(h2);
        assert_eq!(registry.active_count(), 1);
        assert!(registry.get("a").is_some());
        assert!(registry.get("zzz").is_none());
    }
}

//! Spectator fan-out: snapshots encoded once and pushed to every subscriber

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};

use crate::config::MatchSettings;
use crate::game::{GameEvent, Snapshot};
use crate::scheduler::{LifecycleObserver, MatchStatus};
use crate::store::MatchResult;
use crate::ws::protocol::ServerMsg;

struct Subscriber {
    frames: mpsc::Sender<Bytes>,
    control: mpsc::UnboundedSender<Bytes>,
}

/// Receiving ends handed to one spectator connection
pub struct Subscription {
    pub id: u64,
    /// Throttled snapshot frames; closes when the subscriber falls behind
    pub frames: mpsc::Receiver<Bytes>,
    /// Life-cycle events, never dropped
    pub control: mpsc::UnboundedReceiver<Bytes>,
}

/// Many-subscriber push channel
pub struct Fanout {
    subscribers: DashMap<u64, Subscriber>,
    next_id: AtomicU64,
    buffer: usize,
    interval_ticks: u64,
    /// Events from ticks skipped by the throttle, sent with the next frame
    pending_events: Mutex<Vec<GameEvent>>,
}

impl Fanout {
    pub fn new(settings: &MatchSettings) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: settings.subscriber_buffer.max(1),
            interval_ticks: settings.broadcast_interval_ticks() as u64,
            pending_events: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (frames_tx, frames_rx) = mpsc::channel(self.buffer);
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        self.subscribers.insert(
            id,
            Subscriber {
                frames: frames_tx,
                control: control_tx,
            },
        );
        debug!(subscriber_id = id, "Spectator subscribed");

        Subscription {
            id,
            frames: frames_rx,
            control: control_rx,
        }
    }

    pub fn unsubscribe(&self, id: u64) {
        if self.subscribers.remove(&id).is_some() {
            debug!(subscriber_id = id, "Spectator unsubscribed");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Push a frame without waiting; full or closed subscribers are dropped
    fn publish_frame(&self, frame: Bytes) {
        let mut dropped = Vec::new();

        for entry in self.subscribers.iter() {
            match entry.frames.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber_id = *entry.key(), "Spectator too slow, disconnecting");
                    dropped.push(*entry.key());
                }
                Err(TrySendError::Closed(_)) => dropped.push(*entry.key()),
            }
        }

        for id in dropped {
            self.subscribers.remove(&id);
        }
    }

    fn publish_control(&self, message: Bytes) {
        self.subscribers
            .retain(|_, subscriber| subscriber.control.send(message.clone()).is_ok());
    }
}

/// Encode a message once for every subscriber
pub fn encode(msg: &ServerMsg<'_>) -> Option<Bytes> {
    match serde_json::to_vec(msg) {
        Ok(json) => Some(Bytes::from(json)),
        Err(e) => {
            error!(error = %e, "Failed to encode spectator message");
            None
        }
    }
}

impl LifecycleObserver for Fanout {
    fn on_lobby_open(&self, status: &MatchStatus) {
        if let Some(message) = encode(&ServerMsg::LobbyOpen(status)) {
            self.publish_control(message);
        }
    }

    fn on_status_changed(&self, status: &MatchStatus) {
        if let Some(message) = encode(&ServerMsg::StatusChanged(status)) {
            self.publish_control(message);
        }
    }

    fn on_state_update(&self, snapshot: &Arc<Snapshot>, terminal: bool) {
        if !terminal && snapshot.tick % self.interval_ticks != 0 {
            if !snapshot.events.is_empty() {
                self.pending_events.lock().extend(snapshot.events.iter().cloned());
            }
            return;
        }

        let carried = std::mem::take(&mut *self.pending_events.lock());
        if self.subscribers.is_empty() {
            return;
        }

        let frame = if carried.is_empty() {
            encode(&ServerMsg::Snapshot(snapshot))
        } else {
            let mut merged = Snapshot::clone(snapshot);
            merged.events = carried;
            merged.events.extend(snapshot.events.iter().cloned());
            encode(&ServerMsg::Snapshot(&merged))
        };
        if let Some(frame) = frame {
            self.publish_frame(frame);
        }
    }

    fn on_match_end(&self, result: &MatchResult) {
        if let Some(message) = encode(&ServerMsg::MatchEnd(result)) {
            self.publish_control(message);
        }
    }
}

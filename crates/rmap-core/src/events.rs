//! Status notifications.
//!
//! Every `status()` call publishes one [`StatusEvent`] on the generic channel
//! and one on the channel scoped to the event's PID, so observers of a single
//! object do not have to filter the global stream. Scoped channels are created
//! lazily on first subscription and dropped once nobody listens.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::status::StatusLabel;

const CHANNEL_CAPACITY: usize = 256;

/// Payload carried by both the generic and the scoped notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub pid: String,
    pub label: StatusLabel,
    pub rm: Option<String>,
    pub meta: Value,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    /// Name of the channel this event is scoped to, e.g. `status:doi:10.x/y`.
    pub fn scoped_name(&self) -> String {
        format!("status:{}", self.pid)
    }
}

/// Publish/subscribe hub for status events.
#[derive(Debug)]
pub struct StatusBus {
    generic: broadcast::Sender<StatusEvent>,
    scoped: Mutex<HashMap<String, broadcast::Sender<StatusEvent>>>,
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBus {
    pub fn new() -> Self {
        let (generic, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            generic,
            scoped: Mutex::new(HashMap::new()),
        }
    }

    /// Receive every event (the `"status"` channel).
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.generic.subscribe()
    }

    /// Receive only events about `pid` (the `"status:<pid>"` channel).
    pub fn subscribe_pid(&self, pid: &str) -> broadcast::Receiver<StatusEvent> {
        let mut scoped = self.scoped.lock().unwrap_or_else(|e| e.into_inner());
        scoped
            .entry(pid.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Send `event` on the generic channel and on its scoped channel.
    ///
    /// Sending without receivers is not an error; the event is just dropped.
    pub fn publish(&self, event: StatusEvent) {
        {
            let mut scoped = self.scoped.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(tx) = scoped.get(&event.pid) {
                if tx.send(event.clone()).is_err() {
                    scoped.remove(&event.pid);
                }
            }
        }
        let _ = self.generic.send(event);
    }

    /// Drop `pid`'s scoped channel if no receiver is left on it.
    pub fn release(&self, pid: &str) {
        let mut scoped = self.scoped.lock().unwrap_or_else(|e| e.into_inner());
        if scoped
            .get(pid)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            scoped.remove(pid);
        }
    }

    /// Number of PIDs that currently have a scoped channel.
    pub fn scoped_channels(&self) -> usize {
        self.scoped
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

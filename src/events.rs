//! Change notifications and commands delivered to the session
//!
//! Every producer (store hooks, page observers, the CLI, the async handle)
//! only sends events. The session applies them one at a time on its own
//! thread, so observer state is never touched concurrently.

use crate::panel::PanelState;
use crate::readiness::DelayTime;
use crate::store::StoreHooks;
use crate::sweep::SweepReport;
use crate::Result;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tokio::sync::oneshot;

/// Optional reply channel attached to a command
pub type Reply<T> = Option<oneshot::Sender<T>>;

/// Something the session should react to
#[derive(Debug)]
pub enum Event {
    /// A write to a watched key made in this browsing context
    StoreWritten { key: String, value: String },
    /// A store change made by another browsing context (`key` is `None` when
    /// the whole store was cleared, `value` is `None` when the key was removed)
    StorageChanged { key: Option<String>, value: Option<String> },
    /// The page counter text changed (`None` when the element went away)
    CounterChanged(Option<String>),
    /// The document title changed
    TitleChanged(String),
    /// A user command
    Command(Command),
}

/// User-facing actions
#[derive(Debug)]
pub enum Command {
    /// Press the action trigger
    Start(Reply<Result<SweepReport>>),
    /// Edit the delay field (seconds, as typed)
    SetDelay(String, Reply<Result<DelayTime>>),
    /// Edit the volume name field
    SetVolumeName(String, Reply<()>),
    /// Snapshot the status panel
    Status(Reply<PanelState>),
    /// Stop the session loop
    Shutdown(Reply<()>),
}

/// Cloneable sending side of an [`EventBus`]
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<Event>,
}

impl EventSender {
    /// Deliver an event; silently dropped when the session is gone
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// Deliver an event, reporting whether the session is still listening
    pub fn try_emit(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Single-consumer event queue owned by the session
#[derive(Debug)]
pub struct EventBus {
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> EventSender {
        EventSender { tx: self.tx.clone() }
    }

    /// Next pending event, without blocking
    pub fn try_recv(&self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Event> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn every intercepted write of `key` into a [`Event::StoreWritten`]
pub fn forward_store_writes(hooks: &StoreHooks, key: &str, events: EventSender) {
    hooks.on_write(key, move |key, value| {
        events.emit(Event::StoreWritten { key: key.to_string(), value: value.to_string() });
    });
}

//! The surface handed to the presentation layer.

use log::warn;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::radio::RadioLink;
use crate::session::events::{Command, RadioEvent};
use crate::session::manager::SessionManager;
use crate::session::types::Snapshot;

/// Commands are queued per caller; a UI cannot realistically outrun
/// this before the loop drains it.
const COMMAND_QUEUE_DEPTH: usize = 32;

/// Cloneable, non-blocking handle to a running session manager.
///
/// Every command is fire-and-forget; results show up in the observed
/// [`Snapshot`] stream. Dropping all handles does not stop the manager,
/// use [`SessionHandle::shutdown`] for that.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Snapshot>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Spawns the session manager event loop on the current tokio
    /// runtime. `events` is the completion-event channel the radio
    /// backend writes to.
    pub fn spawn<R>(radio: R, events: mpsc::Receiver<RadioEvent>) -> Self
    where
        R: RadioLink + 'static,
    {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let manager = SessionManager::new(radio);
        let snapshot = manager.subscribe();
        let cancel = CancellationToken::new();
        tokio::spawn(manager.run(commands_rx, events, cancel.clone()));
        Self {
            commands: commands_tx,
            snapshot,
            cancel,
        }
    }

    pub fn start_scanning(&self) {
        self.send(Command::StartScanning);
    }

    pub fn stop_scanning(&self) {
        self.send(Command::StopScanning);
    }

    pub fn connect(&self, id: impl Into<String>) {
        self.send(Command::Connect { id: id.into() });
    }

    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    pub fn select_service(&self, service: Uuid) {
        self.send(Command::SelectService { service });
    }

    pub fn read_value(&self, characteristic: Uuid) {
        self.send(Command::ReadValue { characteristic });
    }

    pub fn write_value(&self, characteristic: Uuid, text: impl Into<String>) {
        self.send(Command::WriteValue {
            characteristic,
            text: text.into(),
        });
    }

    pub fn set_notifications(&self, characteristic: Uuid, enabled: bool) {
        self.send(Command::SetNotifications {
            characteristic,
            enabled,
        });
    }

    /// The most recently published observable state.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver for awaiting state changes, e.g. with
    /// [`watch::Receiver::wait_for`].
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    /// Stops the session manager loop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn send(&self, command: Command) {
        if let Err(e) = self.commands.try_send(command) {
            warn!("Dropping command, session manager busy or gone: {}", e);
        }
    }
}

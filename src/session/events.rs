//! Typed messages flowing into the session manager.
//!
//! The radio stack's callback style is modeled as a channel of typed
//! completion events consumed by a single event loop, so every state
//! mutation happens in one place.

use uuid::Uuid;

use crate::session::types::{AdapterState, CharacteristicInfo};

/// A caller command, issued by the presentation layer.
///
/// Commands never block and never return errors; preconditions that do
/// not hold (adapter off, wrong phase, unknown target) drop the command
/// silently and the observable state stays unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartScanning,
    StopScanning,
    Connect { id: String },
    Disconnect,
    SelectService { service: Uuid },
    ReadValue { characteristic: Uuid },
    WriteValue { characteristic: Uuid, text: String },
    SetNotifications { characteristic: Uuid, enabled: bool },
}

/// An asynchronous completion event from the radio stack.
///
/// Events arrive at most once per request, in no guaranteed order
/// relative to other in-flight requests. Events referring to a
/// superseded session are ignored by the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    AdapterStateChanged(AdapterState),
    PeripheralDiscovered {
        id: String,
        name: Option<String>,
        address: Option<String>,
        rssi: Option<i16>,
    },
    Connected {
        id: String,
    },
    ConnectFailed {
        id: String,
        reason: String,
    },
    Disconnected {
        id: String,
        reason: Option<String>,
    },
    ServicesDiscovered {
        id: String,
        services: Vec<Uuid>,
        error: Option<String>,
    },
    CharacteristicsDiscovered {
        service: Uuid,
        characteristics: Vec<CharacteristicInfo>,
        error: Option<String>,
    },
    /// Completion of an explicit read, or a notification push; both
    /// deliver a new value for the characteristic.
    ValueUpdated {
        characteristic: Uuid,
        value: Vec<u8>,
        error: Option<String>,
    },
    WriteCompleted {
        characteristic: Uuid,
        error: Option<String>,
    },
    NotifyStateChanged {
        characteristic: Uuid,
        error: Option<String>,
    },
}

//! The BLE central session: adapter state, discovery, the connection
//! state machine, and characteristic I/O, driven by typed events.

mod events;
mod handle;
mod manager;
mod types;

pub use events::{Command, RadioEvent};
pub use handle::SessionHandle;
pub use manager::SessionManager;
pub use types::{
    ActiveSession, AdapterState, CharacteristicInfo, CharacteristicProps, PeripheralHandle, Phase,
    Session, Snapshot, WriteStatus,
};

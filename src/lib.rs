//! BLE central session manager.
//!
//! Scans for peripherals, drives a single connection through service
//! and characteristic discovery, and mediates read/write/notify
//! requests against asynchronous radio callbacks. The presentation
//! layer observes [`session::Snapshot`]s and issues commands through a
//! [`session::SessionHandle`]; the radio side is abstracted behind
//! [`radio::RadioLink`], with a `bluest`-backed implementation behind
//! the `bluest-backend` feature.

pub mod constants;
pub mod error;
pub mod radio;
pub mod session;

pub use error::RadioError;
pub use radio::RadioLink;
pub use session::{
    AdapterState, CharacteristicInfo, CharacteristicProps, Command, PeripheralHandle, Phase,
    RadioEvent, SessionHandle, SessionManager, Snapshot, WriteStatus,
};

/// Initialize logging.
pub fn init_logging() {
    env_logger::init();
    log::info!("Logging initialized");
}

//! The capability contract against the underlying BLE stack.
//!
//! Every method issues a request and returns as soon as the request is
//! on its way; completion is reported later through the
//! [`RadioEvent`](crate::session::RadioEvent) channel handed to the
//! backend at construction. The session manager is the only consumer of
//! that channel, which keeps all state mutation single-writer.

use uuid::Uuid;

use crate::error::RadioError;

pub mod mock;

#[cfg(feature = "bluest-backend")]
pub mod bluest_link;

/// Issue-only interface to a BLE central radio.
#[async_trait::async_trait]
pub trait RadioLink: Send + Sync {
    /// Begin continuous advertisement listening with no service filter.
    async fn start_scan(&self) -> Result<(), RadioError>;

    /// Halt advertisement listening. Idempotent.
    async fn stop_scan(&self) -> Result<(), RadioError>;

    async fn connect(&self, id: &str) -> Result<(), RadioError>;

    async fn disconnect(&self, id: &str) -> Result<(), RadioError>;

    /// Discover all services of a connected peripheral.
    async fn discover_services(&self, id: &str) -> Result<(), RadioError>;

    /// Discover all characteristics of one service.
    async fn discover_characteristics(&self, id: &str, service: Uuid) -> Result<(), RadioError>;

    async fn read_characteristic(&self, characteristic: Uuid) -> Result<(), RadioError>;

    /// Write with response; the confirmation arrives as a
    /// `WriteCompleted` event.
    async fn write_characteristic(
        &self,
        characteristic: Uuid,
        payload: Vec<u8>,
    ) -> Result<(), RadioError>;

    async fn set_notify(&self, characteristic: Uuid, enabled: bool) -> Result<(), RadioError>;
}

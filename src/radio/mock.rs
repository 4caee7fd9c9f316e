//! Scripted radio for host-side tests.
//!
//! Records every issued request so tests can assert on what the session
//! manager sent to the hardware; completions are injected by the test
//! through the event channel, same as a real backend would.

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::error::RadioError;
use crate::radio::RadioLink;

/// A request the session manager issued to the radio.
#[derive(Debug, Clone, PartialEq)]
pub enum IssuedRequest {
    StartScan,
    StopScan,
    Connect(String),
    Disconnect(String),
    DiscoverServices(String),
    DiscoverCharacteristics(String, Uuid),
    Read(Uuid),
    Write(Uuid, Vec<u8>),
    SetNotify(Uuid, bool),
}

#[derive(Debug, Clone, Default)]
pub struct MockRadio {
    issued: Arc<Mutex<Vec<IssuedRequest>>>,
}

impl MockRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// All requests issued so far, in order.
    pub fn issued(&self) -> Vec<IssuedRequest> {
        self.issued.lock().unwrap().clone()
    }

    /// Drains and returns the recorded requests.
    pub fn take_issued(&self) -> Vec<IssuedRequest> {
        std::mem::take(&mut *self.issued.lock().unwrap())
    }

    fn record(&self, request: IssuedRequest) {
        self.issued.lock().unwrap().push(request);
    }
}

#[async_trait::async_trait]
impl RadioLink for MockRadio {
    async fn start_scan(&self) -> Result<(), RadioError> {
        self.record(IssuedRequest::StartScan);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        self.record(IssuedRequest::StopScan);
        Ok(())
    }

    async fn connect(&self, id: &str) -> Result<(), RadioError> {
        self.record(IssuedRequest::Connect(id.to_string()));
        Ok(())
    }

    async fn disconnect(&self, id: &str) -> Result<(), RadioError> {
        self.record(IssuedRequest::Disconnect(id.to_string()));
        Ok(())
    }

    async fn discover_services(&self, id: &str) -> Result<(), RadioError> {
        self.record(IssuedRequest::DiscoverServices(id.to_string()));
        Ok(())
    }

    async fn discover_characteristics(&self, id: &str, service: Uuid) -> Result<(), RadioError> {
        self.record(IssuedRequest::DiscoverCharacteristics(id.to_string(), service));
        Ok(())
    }

    async fn read_characteristic(&self, characteristic: Uuid) -> Result<(), RadioError> {
        self.record(IssuedRequest::Read(characteristic));
        Ok(())
    }

    async fn write_characteristic(
        &self,
        characteristic: Uuid,
        payload: Vec<u8>,
    ) -> Result<(), RadioError> {
        self.record(IssuedRequest::Write(characteristic, payload));
        Ok(())
    }

    async fn set_notify(&self, characteristic: Uuid, enabled: bool) -> Result<(), RadioError> {
        self.record(IssuedRequest::SetNotify(characteristic, enabled));
        Ok(())
    }
}

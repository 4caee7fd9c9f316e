//! The session manager: adapter state tracking, peripheral discovery,
//! the connection state machine, and characteristic I/O coordination.
//!
//! All mutable state lives here and is touched only by
//! [`SessionManager::handle_command`] and
//! [`SessionManager::handle_event`], serialized by the [`run`] loop.
//! Observers see consistent snapshots through a watch channel and never
//! a torn intermediate state.
//!
//! [`run`]: SessionManager::run

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::radio::RadioLink;
use crate::session::events::{Command, RadioEvent};
use crate::session::types::{
    ActiveSession, AdapterState, CharacteristicInfo, PeripheralHandle, Phase, Session, Snapshot,
    WriteStatus,
};

pub struct SessionManager<R: RadioLink> {
    radio: R,
    adapter_state: AdapterState,
    scanning: bool,
    discovered: Vec<PeripheralHandle>,
    session: Session,
    last_connect_failure: Option<String>,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl<R: RadioLink> SessionManager<R> {
    pub fn new(radio: R) -> Self {
        let (snapshot_tx, _) = watch::channel(Snapshot::default());
        Self {
            radio,
            adapter_state: AdapterState::Unknown,
            scanning: false,
            discovered: Vec::new(),
            session: Session::Idle,
            last_connect_failure: None,
            snapshot_tx,
        }
    }

    /// A receiver of observable-state snapshots. One snapshot is
    /// published after every command or event is applied.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    /// The current observable state.
    pub fn snapshot(&self) -> Snapshot {
        let (services, selected_service, characteristics, last_read, last_write) =
            match &self.session {
                Session::Active(active) => (
                    active.services.clone().unwrap_or_default(),
                    active.selected_service,
                    active.characteristics.clone().unwrap_or_default(),
                    active.last_read.clone(),
                    active.last_write.clone(),
                ),
                _ => (Vec::new(), None, Vec::new(), None, None),
            };
        Snapshot {
            adapter_state: self.adapter_state,
            scanning: self.scanning,
            discovered: self.discovered.clone(),
            phase: self.session.phase(),
            peripheral: self.session.peripheral().cloned(),
            services,
            selected_service,
            characteristics,
            last_read,
            last_write,
            connect_failed: self.last_connect_failure.clone(),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    /// Consumes commands and radio events until cancelled or both
    /// channels close.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::Receiver<RadioEvent>,
        cancel: CancellationToken,
    ) {
        info!("Session manager loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Session manager loop cancelled");
                    break;
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        info!("Radio event channel closed, stopping session manager");
                        break;
                    }
                },
            }
        }
    }

    /// Applies one caller command. Commands whose preconditions do not
    /// hold are dropped without surfacing an error.
    pub async fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartScanning => self.start_scanning().await,
            Command::StopScanning => self.stop_scanning().await,
            Command::Connect { id } => self.connect(&id).await,
            Command::Disconnect => self.disconnect().await,
            Command::SelectService { service } => self.select_service(service).await,
            Command::ReadValue { characteristic } => self.read_value(characteristic).await,
            Command::WriteValue {
                characteristic,
                text,
            } => self.write_value(characteristic, text).await,
            Command::SetNotifications {
                characteristic,
                enabled,
            } => self.set_notifications(characteristic, enabled).await,
        }
        self.publish();
    }

    /// Applies one radio completion event. Events that no longer match
    /// the current session are stale and ignored.
    pub async fn handle_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::AdapterStateChanged(state) => {
                info!("Adapter state changed: {:?}", state);
                self.adapter_state = state;
            }
            RadioEvent::PeripheralDiscovered {
                id,
                name,
                address,
                rssi,
            } => self.peripheral_discovered(id, name, address, rssi),
            RadioEvent::Connected { id } => self.connected(&id).await,
            RadioEvent::ConnectFailed { id, reason } => self.connect_failed(&id, reason),
            RadioEvent::Disconnected { id, reason } => self.disconnected(&id, reason),
            RadioEvent::ServicesDiscovered {
                id,
                services,
                error,
            } => self.services_discovered(&id, services, error).await,
            RadioEvent::CharacteristicsDiscovered {
                service,
                characteristics,
                error,
            } => self.characteristics_discovered(service, characteristics, error),
            RadioEvent::ValueUpdated {
                characteristic,
                value,
                error,
            } => self.value_updated(characteristic, value, error),
            RadioEvent::WriteCompleted {
                characteristic,
                error,
            } => self.write_completed(characteristic, error),
            RadioEvent::NotifyStateChanged {
                characteristic,
                error,
            } => {
                if let Some(reason) = error {
                    error!(
                        "Changing notification state for {} failed: {}",
                        characteristic, reason
                    );
                }
            }
        }
        self.publish();
    }

    // --- Discovery controller --------------------------------------

    async fn start_scanning(&mut self) {
        if !self.adapter_state.is_powered_on() {
            debug!(
                "Ignoring scan request, adapter is {:?}",
                self.adapter_state
            );
            return;
        }
        self.discovered.clear();
        self.scanning = true;
        info!("Starting peripheral scan");
        if let Err(e) = self.radio.start_scan().await {
            error!("Failed to start scan: {}", e);
        }
    }

    async fn stop_scanning(&mut self) {
        self.scanning = false;
        if let Err(e) = self.radio.stop_scan().await {
            error!("Failed to stop scan: {}", e);
        }
    }

    fn peripheral_discovered(
        &mut self,
        id: String,
        name: Option<String>,
        address: Option<String>,
        rssi: Option<i16>,
    ) {
        // First advertisement wins; repeats do not update the entry
        if self.discovered.iter().any(|p| p.id == id) {
            return;
        }
        debug!("Discovered peripheral {} ({:?}, rssi {:?})", id, name, rssi);
        self.discovered.push(PeripheralHandle {
            id,
            name,
            address,
            rssi,
        });
    }

    // --- Connection state machine ----------------------------------

    async fn connect(&mut self, id: &str) {
        if !self.adapter_state.is_powered_on() {
            debug!(
                "Ignoring connect request, adapter is {:?}",
                self.adapter_state
            );
            return;
        }
        if !matches!(self.session, Session::Idle) {
            warn!(
                "Ignoring connect request for {} while {:?}",
                id,
                self.session.phase()
            );
            return;
        }
        let Some(handle) = self.discovered.iter().find(|p| p.id == id).cloned() else {
            warn!("Ignoring connect request for unknown peripheral {}", id);
            return;
        };
        info!("Connecting to {} ({:?})", handle.id, handle.name);
        self.last_connect_failure = None;
        self.session = Session::Connecting(handle);
        if let Err(e) = self.radio.connect(id).await {
            error!("Failed to issue connect request: {}", e);
        }
    }

    async fn connected(&mut self, id: &str) {
        let Session::Connecting(handle) = &self.session else {
            debug!("Ignoring stale connected event for {}", id);
            return;
        };
        if handle.id != id {
            debug!("Ignoring connected event for unexpected peripheral {}", id);
            return;
        }
        let handle = handle.clone();
        info!("Connected to {}, discovering services", handle.id);
        // Discovery and an active connection are never concurrent
        self.stop_scanning().await;
        self.session = Session::Active(ActiveSession::new(handle));
        if let Err(e) = self.radio.discover_services(id).await {
            error!("Failed to issue service discovery: {}", e);
        }
    }

    fn connect_failed(&mut self, id: &str, reason: String) {
        match &self.session {
            Session::Connecting(handle) if handle.id == id => {
                warn!("Failed to connect to {}: {}", id, reason);
                self.last_connect_failure = Some(reason);
                self.session = Session::Idle;
            }
            _ => debug!("Ignoring stale connect-failed event for {}", id),
        }
    }

    fn disconnected(&mut self, id: &str, reason: Option<String>) {
        let current = self.session.peripheral().map(|p| p.id.clone());
        if current.as_deref() != Some(id) {
            debug!("Ignoring disconnect event for non-session peripheral {}", id);
            return;
        }
        info!("Peripheral {} disconnected ({:?})", id, reason);
        self.session = Session::Idle;
    }

    async fn disconnect(&mut self) {
        let Some(peripheral) = self.session.peripheral().cloned() else {
            debug!("Ignoring disconnect request, no session");
            return;
        };
        info!("Disconnecting from {}", peripheral.id);
        // Reset right away; the hardware confirmation then finds an
        // idle session and is ignored, as is any other completion of
        // the superseded session.
        self.session = Session::Idle;
        if let Err(e) = self.radio.disconnect(&peripheral.id).await {
            error!("Failed to issue disconnect request: {}", e);
        }
    }

    async fn services_discovered(
        &mut self,
        id: &str,
        services: Vec<Uuid>,
        error: Option<String>,
    ) {
        let Session::Active(active) = &mut self.session else {
            debug!("Ignoring stale services-discovered event for {}", id);
            return;
        };
        if active.peripheral.id != id {
            debug!("Ignoring services-discovered event for {}", id);
            return;
        }
        if let Some(reason) = error {
            // Error leaves the service set and phase untouched
            error!("Service discovery on {} failed: {}", id, reason);
            return;
        }
        let mut unique: Vec<Uuid> = Vec::with_capacity(services.len());
        for service in services {
            if !unique.contains(&service) {
                unique.push(service);
            }
        }
        info!("Discovered {} services on {}", unique.len(), id);
        active.services = Some(unique.clone());
        // Fan out characteristic discovery; completions may arrive in
        // any order and only the selected service's set is retained.
        for service in unique {
            if let Err(e) = self.radio.discover_characteristics(id, service).await {
                error!(
                    "Failed to issue characteristic discovery for {}: {}",
                    service, e
                );
            }
        }
    }

    async fn select_service(&mut self, service: Uuid) {
        let Session::Active(active) = &mut self.session else {
            debug!("Ignoring service selection, no active session");
            return;
        };
        if !active
            .services
            .as_ref()
            .is_some_and(|s| s.contains(&service))
        {
            debug!("Ignoring selection of undiscovered service {}", service);
            return;
        }
        info!("Selected service {}", service);
        active.selected_service = Some(service);
        active.characteristics = None;
        let id = active.peripheral.id.clone();
        if let Err(e) = self.radio.discover_characteristics(&id, service).await {
            error!(
                "Failed to issue characteristic discovery for {}: {}",
                service, e
            );
        }
    }

    fn characteristics_discovered(
        &mut self,
        service: Uuid,
        characteristics: Vec<CharacteristicInfo>,
        error: Option<String>,
    ) {
        let Session::Active(active) = &mut self.session else {
            debug!("Ignoring stale characteristics-discovered event");
            return;
        };
        if active.selected_service != Some(service) {
            // Fan-out result for a service the caller has not selected
            debug!("Dropping characteristics of unselected service {}", service);
            return;
        }
        if let Some(reason) = error {
            error!("Characteristic discovery on {} failed: {}", service, reason);
            return;
        }
        let mut unique: Vec<CharacteristicInfo> = Vec::with_capacity(characteristics.len());
        for characteristic in characteristics {
            if !unique.iter().any(|c| c.uuid == characteristic.uuid) {
                unique.push(characteristic);
            }
        }
        info!(
            "Discovered {} characteristics on service {}",
            unique.len(),
            service
        );
        active.characteristics = Some(unique);
    }

    // --- Characteristic I/O coordinator ----------------------------

    /// Whether I/O against a characteristic is currently permitted.
    fn io_target(&mut self, characteristic: Uuid) -> Option<&mut ActiveSession> {
        if self.session.phase() != Phase::Ready {
            debug!(
                "Dropping request for {}, session is {:?}",
                characteristic,
                self.session.phase()
            );
            return None;
        }
        match &mut self.session {
            Session::Active(active) if active.has_characteristic(characteristic) => Some(active),
            _ => {
                debug!(
                    "Dropping request for {} outside the selected service",
                    characteristic
                );
                None
            }
        }
    }

    async fn read_value(&mut self, characteristic: Uuid) {
        if self.io_target(characteristic).is_none() {
            return;
        }
        if let Err(e) = self.radio.read_characteristic(characteristic).await {
            error!("Failed to issue read for {}: {}", characteristic, e);
        }
    }

    async fn write_value(&mut self, characteristic: Uuid, text: String) {
        let Some(active) = self.io_target(characteristic) else {
            return;
        };
        // Pending is visible before any completion can arrive
        active.last_write = Some(WriteStatus::Pending);
        let payload = text.into_bytes();
        if let Err(e) = self.radio.write_characteristic(characteristic, payload).await {
            error!("Failed to issue write for {}: {}", characteristic, e);
        }
    }

    async fn set_notifications(&mut self, characteristic: Uuid, enabled: bool) {
        if self.io_target(characteristic).is_none() {
            return;
        }
        info!(
            "{} notifications for {}",
            if enabled { "Enabling" } else { "Disabling" },
            characteristic
        );
        if let Err(e) = self.radio.set_notify(characteristic, enabled).await {
            error!(
                "Failed to issue notify request for {}: {}",
                characteristic, e
            );
        }
    }

    fn value_updated(&mut self, characteristic: Uuid, value: Vec<u8>, error: Option<String>) {
        let Session::Active(active) = &mut self.session else {
            debug!("Ignoring stale value update for {}", characteristic);
            return;
        };
        if let Some(reason) = error {
            error!("Reading {} failed: {}", characteristic, reason);
            return;
        }
        // Non-text payloads leave the last value untouched
        match String::from_utf8(value) {
            Ok(text) => active.last_read = Some(text),
            Err(_) => debug!("Dropping non-UTF-8 value from {}", characteristic),
        }
    }

    fn write_completed(&mut self, characteristic: Uuid, error: Option<String>) {
        let Session::Active(active) = &mut self.session else {
            debug!("Ignoring stale write completion for {}", characteristic);
            return;
        };
        active.last_write = Some(match error {
            None => WriteStatus::Success,
            Some(reason) => {
                warn!("Write to {} failed: {}", characteristic, reason);
                WriteStatus::Failed(reason)
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::mock::{IssuedRequest, MockRadio};
    use crate::session::types::CharacteristicProps;

    const SVC_1: Uuid = Uuid::from_u128(0x1111);
    const SVC_2: Uuid = Uuid::from_u128(0x2222);
    const CHR_1: Uuid = Uuid::from_u128(0xaaaa);
    const CHR_2: Uuid = Uuid::from_u128(0xbbbb);
    const CHR_3: Uuid = Uuid::from_u128(0xcccc);

    fn manager() -> (SessionManager<MockRadio>, MockRadio) {
        let radio = MockRadio::new();
        (SessionManager::new(radio.clone()), radio)
    }

    async fn powered_on(manager: &mut SessionManager<MockRadio>) {
        manager
            .handle_event(RadioEvent::AdapterStateChanged(AdapterState::PoweredOn))
            .await;
    }

    fn advert(id: &str, name: &str) -> RadioEvent {
        RadioEvent::PeripheralDiscovered {
            id: id.to_string(),
            name: Some(name.to_string()),
            address: None,
            rssi: Some(-50),
        }
    }

    fn chr(uuid: Uuid) -> CharacteristicInfo {
        CharacteristicInfo {
            uuid,
            props: CharacteristicProps {
                read: true,
                write: true,
                notify: true,
                ..CharacteristicProps::default()
            },
        }
    }

    /// Drives a fresh manager to the Ready phase on peripheral "A"
    /// with SVC_1 selected and CHR_1/CHR_2 discovered.
    async fn ready_session() -> (SessionManager<MockRadio>, MockRadio) {
        let (mut m, radio) = manager();
        powered_on(&mut m).await;
        m.handle_event(advert("A", "Dev1")).await;
        m.handle_command(Command::Connect { id: "A".into() }).await;
        m.handle_event(RadioEvent::Connected { id: "A".into() }).await;
        m.handle_event(RadioEvent::ServicesDiscovered {
            id: "A".into(),
            services: vec![SVC_1, SVC_2],
            error: None,
        })
        .await;
        m.handle_command(Command::SelectService { service: SVC_1 }).await;
        m.handle_event(RadioEvent::CharacteristicsDiscovered {
            service: SVC_1,
            characteristics: vec![chr(CHR_1), chr(CHR_2)],
            error: None,
        })
        .await;
        assert_eq!(m.snapshot().phase, Phase::Ready);
        radio.take_issued();
        (m, radio)
    }

    #[tokio::test]
    async fn scan_requires_powered_on_adapter() {
        let (mut m, radio) = manager();
        m.handle_command(Command::StartScanning).await;
        let snapshot = m.snapshot();
        assert!(!snapshot.scanning);
        assert!(snapshot.discovered.is_empty());
        assert!(radio.issued().is_empty());

        powered_on(&mut m).await;
        m.handle_command(Command::StartScanning).await;
        assert!(m.snapshot().scanning);
        assert_eq!(radio.issued(), vec![IssuedRequest::StartScan]);
    }

    #[tokio::test]
    async fn repeated_advertisements_are_deduplicated() {
        let (mut m, _radio) = manager();
        powered_on(&mut m).await;
        m.handle_command(Command::StartScanning).await;
        m.handle_event(advert("A", "Dev1")).await;
        m.handle_event(advert("A", "Dev1")).await;
        m.handle_event(advert("B", "Dev1")).await;
        let discovered = m.snapshot().discovered;
        assert_eq!(discovered.len(), 2);
        assert_eq!(discovered[0].id, "A");
        assert_eq!(discovered[1].id, "B");
    }

    #[tokio::test]
    async fn scan_start_clears_previous_results() {
        let (mut m, _radio) = manager();
        powered_on(&mut m).await;
        m.handle_command(Command::StartScanning).await;
        m.handle_event(advert("A", "Dev1")).await;
        m.handle_command(Command::StartScanning).await;
        assert!(m.snapshot().discovered.is_empty());
    }

    #[tokio::test]
    async fn connect_success_stops_scanning_and_discovers_services() {
        let (mut m, radio) = manager();
        powered_on(&mut m).await;
        m.handle_command(Command::StartScanning).await;
        m.handle_event(advert("A", "Dev1")).await;
        m.handle_command(Command::Connect { id: "A".into() }).await;
        assert_eq!(m.snapshot().phase, Phase::Connecting);

        m.handle_event(RadioEvent::Connected { id: "A".into() }).await;
        let snapshot = m.snapshot();
        assert_eq!(snapshot.phase, Phase::DiscoveringServices);
        assert!(!snapshot.scanning);
        assert_eq!(
            radio.issued(),
            vec![
                IssuedRequest::StartScan,
                IssuedRequest::Connect("A".into()),
                IssuedRequest::StopScan,
                IssuedRequest::DiscoverServices("A".into()),
            ]
        );
    }

    #[tokio::test]
    async fn connect_requires_powered_on_adapter() {
        let (mut m, radio) = manager();
        m.handle_event(advert("A", "Dev1")).await;
        m.handle_command(Command::Connect { id: "A".into() }).await;
        assert_eq!(m.snapshot().phase, Phase::Idle);
        assert!(radio.issued().is_empty());
    }

    #[tokio::test]
    async fn second_connect_while_busy_is_ignored() {
        let (mut m, radio) = manager();
        powered_on(&mut m).await;
        m.handle_event(advert("A", "Dev1")).await;
        m.handle_event(advert("B", "Dev2")).await;
        m.handle_command(Command::Connect { id: "A".into() }).await;
        radio.take_issued();

        m.handle_command(Command::Connect { id: "B".into() }).await;
        assert!(radio.issued().is_empty());
        assert_eq!(m.snapshot().peripheral.unwrap().id, "A");
    }

    #[tokio::test]
    async fn connect_failure_returns_to_idle_and_is_surfaced() {
        let (mut m, _radio) = manager();
        powered_on(&mut m).await;
        m.handle_event(advert("A", "Dev1")).await;
        m.handle_command(Command::Connect { id: "A".into() }).await;
        m.handle_event(RadioEvent::ConnectFailed {
            id: "A".into(),
            reason: "timeout".into(),
        })
        .await;
        let snapshot = m.snapshot();
        assert_eq!(snapshot.phase, Phase::Idle);
        assert!(snapshot.peripheral.is_none());
        assert_eq!(snapshot.connect_failed.as_deref(), Some("timeout"));

        // A new attempt clears the surfaced failure
        m.handle_command(Command::Connect { id: "A".into() }).await;
        assert!(m.snapshot().connect_failed.is_none());
    }

    #[tokio::test]
    async fn services_discovered_fans_out_characteristic_discovery() {
        let (mut m, radio) = manager();
        powered_on(&mut m).await;
        m.handle_event(advert("A", "Dev1")).await;
        m.handle_command(Command::Connect { id: "A".into() }).await;
        m.handle_event(RadioEvent::Connected { id: "A".into() }).await;
        radio.take_issued();

        m.handle_event(RadioEvent::ServicesDiscovered {
            id: "A".into(),
            services: vec![SVC_1, SVC_2],
            error: None,
        })
        .await;
        let snapshot = m.snapshot();
        assert_eq!(snapshot.phase, Phase::DiscoveringCharacteristics);
        assert_eq!(snapshot.services, vec![SVC_1, SVC_2]);
        assert_eq!(
            radio.issued(),
            vec![
                IssuedRequest::DiscoverCharacteristics("A".into(), SVC_1),
                IssuedRequest::DiscoverCharacteristics("A".into(), SVC_2),
            ]
        );
    }

    #[tokio::test]
    async fn service_discovery_error_leaves_state_unchanged() {
        let (mut m, _radio) = manager();
        powered_on(&mut m).await;
        m.handle_event(advert("A", "Dev1")).await;
        m.handle_command(Command::Connect { id: "A".into() }).await;
        m.handle_event(RadioEvent::Connected { id: "A".into() }).await;
        m.handle_event(RadioEvent::ServicesDiscovered {
            id: "A".into(),
            services: vec![],
            error: Some("gatt failure".into()),
        })
        .await;
        let snapshot = m.snapshot();
        assert_eq!(snapshot.phase, Phase::DiscoveringServices);
        assert!(snapshot.services.is_empty());
    }

    #[tokio::test]
    async fn only_the_selected_services_characteristics_are_retained() {
        let (mut m, _radio) = ready_session().await;
        // A late fan-out completion for the unselected service
        m.handle_event(RadioEvent::CharacteristicsDiscovered {
            service: SVC_2,
            characteristics: vec![chr(CHR_3)],
            error: None,
        })
        .await;
        let snapshot = m.snapshot();
        assert_eq!(snapshot.phase, Phase::Ready);
        assert_eq!(
            snapshot.characteristics.iter().map(|c| c.uuid).collect::<Vec<_>>(),
            vec![CHR_1, CHR_2]
        );
    }

    #[tokio::test]
    async fn selecting_another_service_reissues_discovery() {
        let (mut m, radio) = ready_session().await;
        m.handle_command(Command::SelectService { service: SVC_2 }).await;
        let snapshot = m.snapshot();
        assert_eq!(snapshot.phase, Phase::DiscoveringCharacteristics);
        assert!(snapshot.characteristics.is_empty());
        assert_eq!(
            radio.issued(),
            vec![IssuedRequest::DiscoverCharacteristics("A".into(), SVC_2)]
        );

        m.handle_event(RadioEvent::CharacteristicsDiscovered {
            service: SVC_2,
            characteristics: vec![chr(CHR_3)],
            error: None,
        })
        .await;
        assert_eq!(m.snapshot().phase, Phase::Ready);
    }

    #[tokio::test]
    async fn write_is_pending_until_confirmed() {
        let (mut m, radio) = ready_session().await;
        m.handle_command(Command::WriteValue {
            characteristic: CHR_1,
            text: "hello".into(),
        })
        .await;
        assert_eq!(m.snapshot().last_write, Some(WriteStatus::Pending));
        assert_eq!(
            radio.issued(),
            vec![IssuedRequest::Write(CHR_1, b"hello".to_vec())]
        );

        m.handle_event(RadioEvent::WriteCompleted {
            characteristic: CHR_1,
            error: None,
        })
        .await;
        assert_eq!(m.snapshot().last_write, Some(WriteStatus::Success));

        m.handle_command(Command::WriteValue {
            characteristic: CHR_1,
            text: "hi".into(),
        })
        .await;
        m.handle_event(RadioEvent::WriteCompleted {
            characteristic: CHR_1,
            error: Some("timeout".into()),
        })
        .await;
        assert_eq!(
            m.snapshot().last_write,
            Some(WriteStatus::Failed("timeout".into()))
        );
    }

    #[tokio::test]
    async fn io_against_foreign_characteristic_is_dropped() {
        let (mut m, radio) = ready_session().await;
        m.handle_command(Command::WriteValue {
            characteristic: CHR_3,
            text: "hello".into(),
        })
        .await;
        m.handle_command(Command::ReadValue { characteristic: CHR_3 }).await;
        m.handle_command(Command::SetNotifications {
            characteristic: CHR_3,
            enabled: true,
        })
        .await;
        assert!(radio.issued().is_empty());
        assert!(m.snapshot().last_write.is_none());
    }

    #[tokio::test]
    async fn read_decodes_utf8_and_ignores_binary_payloads() {
        let (mut m, radio) = ready_session().await;
        m.handle_command(Command::ReadValue { characteristic: CHR_1 }).await;
        assert_eq!(radio.issued(), vec![IssuedRequest::Read(CHR_1)]);

        m.handle_event(RadioEvent::ValueUpdated {
            characteristic: CHR_1,
            value: b"23.5C".to_vec(),
            error: None,
        })
        .await;
        assert_eq!(m.snapshot().last_read.as_deref(), Some("23.5C"));

        m.handle_event(RadioEvent::ValueUpdated {
            characteristic: CHR_1,
            value: vec![0xff, 0xfe],
            error: None,
        })
        .await;
        assert_eq!(m.snapshot().last_read.as_deref(), Some("23.5C"));

        m.handle_event(RadioEvent::ValueUpdated {
            characteristic: CHR_1,
            value: Vec::new(),
            error: Some("read error".into()),
        })
        .await;
        assert_eq!(m.snapshot().last_read.as_deref(), Some("23.5C"));
    }

    #[tokio::test]
    async fn notifications_issue_subscribe_without_state_change() {
        let (mut m, radio) = ready_session().await;
        let before = m.snapshot();
        m.handle_command(Command::SetNotifications {
            characteristic: CHR_1,
            enabled: true,
        })
        .await;
        assert_eq!(radio.issued(), vec![IssuedRequest::SetNotify(CHR_1, true)]);
        assert_eq!(m.snapshot(), before);
    }

    #[tokio::test]
    async fn any_disconnect_resets_the_whole_session() {
        // Explicit disconnect
        let (mut m, radio) = ready_session().await;
        m.handle_command(Command::Disconnect).await;
        let snapshot = m.snapshot();
        assert_eq!(snapshot.phase, Phase::Idle);
        assert!(snapshot.peripheral.is_none());
        assert!(snapshot.services.is_empty());
        assert!(snapshot.characteristics.is_empty());
        assert!(snapshot.selected_service.is_none());
        assert!(snapshot.last_read.is_none());
        assert!(snapshot.last_write.is_none());
        assert_eq!(radio.issued(), vec![IssuedRequest::Disconnect("A".into())]);

        // Link loss from an earlier phase
        let (mut m, _radio) = manager();
        powered_on(&mut m).await;
        m.handle_event(advert("A", "Dev1")).await;
        m.handle_command(Command::Connect { id: "A".into() }).await;
        m.handle_event(RadioEvent::Connected { id: "A".into() }).await;
        m.handle_event(RadioEvent::Disconnected {
            id: "A".into(),
            reason: Some("link lost".into()),
        })
        .await;
        assert_eq!(m.snapshot().phase, Phase::Idle);
    }

    #[tokio::test]
    async fn completions_after_disconnect_are_ignored() {
        let (mut m, _radio) = ready_session().await;
        m.handle_command(Command::Disconnect).await;

        m.handle_event(RadioEvent::CharacteristicsDiscovered {
            service: SVC_1,
            characteristics: vec![chr(CHR_1)],
            error: None,
        })
        .await;
        m.handle_event(RadioEvent::ValueUpdated {
            characteristic: CHR_1,
            value: b"stale".to_vec(),
            error: None,
        })
        .await;
        m.handle_event(RadioEvent::WriteCompleted {
            characteristic: CHR_1,
            error: None,
        })
        .await;
        // The trailing hardware confirmation is also a no-op
        m.handle_event(RadioEvent::Disconnected {
            id: "A".into(),
            reason: None,
        })
        .await;

        let snapshot = m.snapshot();
        assert_eq!(snapshot.phase, Phase::Idle);
        assert!(snapshot.characteristics.is_empty());
        assert!(snapshot.last_read.is_none());
        assert!(snapshot.last_write.is_none());
    }
}

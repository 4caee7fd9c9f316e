//! Shared data structures for the session manager.

use serde::Serialize;
use uuid::Uuid;

/// State of the underlying radio adapter, mirrored from the stack's
/// state-change notification. Read as a precondition gate by every
/// command that needs radio access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdapterState {
    #[default]
    Unknown,
    PoweredOn,
    PoweredOff,
    Unauthorized,
    Unsupported,
}

impl AdapterState {
    pub fn is_powered_on(self) -> bool {
        self == AdapterState::PoweredOn
    }
}

/// A discoverable peripheral as shown in the scan list.
///
/// Identity is the platform-specific `id`; names may be absent or
/// duplicated, so equality compares ids only.
#[derive(Debug, Clone, Eq, Serialize)]
pub struct PeripheralHandle {
    /// Platform-specific unique identifier (especially important on macOS)
    pub id: String,
    /// The advertised name, if any
    pub name: Option<String>,
    /// MAC-style address where the platform exposes one
    pub address: Option<String>,
    /// Signal strength at discovery time
    pub rssi: Option<i16>,
}

impl PartialEq for PeripheralHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Capability flags of a characteristic, used by the presentation layer
/// to gate its read/write/notify affordances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CharacteristicProps {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

/// A characteristic of the currently selected service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    pub props: CharacteristicProps,
}

/// Outcome of the most recent write request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "kebab-case")]
pub enum WriteStatus {
    /// Write issued, confirmation not yet received
    Pending,
    Success,
    Failed(String),
}

/// Connection phase, derived from [`Session`], never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    #[default]
    Idle,
    Connecting,
    DiscoveringServices,
    DiscoveringCharacteristics,
    Ready,
}

/// The single active connection context.
///
/// Modeled as a sum type so that invalid combinations (characteristics
/// populated while disconnected, say) cannot be represented.
#[derive(Debug, Clone, Default)]
pub enum Session {
    #[default]
    Idle,
    Connecting(PeripheralHandle),
    Active(ActiveSession),
}

/// Discovery and I/O state of a connected peripheral.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub peripheral: PeripheralHandle,
    /// `None` until the services-discovered completion arrives
    pub services: Option<Vec<Uuid>>,
    /// At most one service is selected; characteristic discovery results
    /// for any other service are dropped.
    pub selected_service: Option<Uuid>,
    /// `None` until the selected service's characteristics arrive
    pub characteristics: Option<Vec<CharacteristicInfo>>,
    /// Last value read (or pushed by notification), decoded as UTF-8
    pub last_read: Option<String>,
    pub last_write: Option<WriteStatus>,
}

impl ActiveSession {
    pub fn new(peripheral: PeripheralHandle) -> Self {
        Self {
            peripheral,
            services: None,
            selected_service: None,
            characteristics: None,
            last_read: None,
            last_write: None,
        }
    }

    /// Whether a characteristic belongs to the selected service's
    /// currently discovered set.
    pub fn has_characteristic(&self, uuid: Uuid) -> bool {
        self.characteristics
            .as_ref()
            .is_some_and(|set| set.iter().any(|c| c.uuid == uuid))
    }
}

impl Session {
    /// Derives the connection phase reactively from what has been
    /// discovered so far, rather than tracking it as separate state.
    pub fn phase(&self) -> Phase {
        match self {
            Session::Idle => Phase::Idle,
            Session::Connecting(_) => Phase::Connecting,
            Session::Active(active) => match (&active.services, &active.characteristics) {
                (None, _) => Phase::DiscoveringServices,
                (Some(_), Some(_)) if active.selected_service.is_some() => Phase::Ready,
                (Some(_), _) => Phase::DiscoveringCharacteristics,
            },
        }
    }

    /// The peripheral this session refers to, if any.
    pub fn peripheral(&self) -> Option<&PeripheralHandle> {
        match self {
            Session::Idle => None,
            Session::Connecting(handle) => Some(handle),
            Session::Active(active) => Some(&active.peripheral),
        }
    }
}

/// The full observable state published to the presentation layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Snapshot {
    pub adapter_state: AdapterState,
    pub scanning: bool,
    pub discovered: Vec<PeripheralHandle>,
    pub phase: Phase,
    pub peripheral: Option<PeripheralHandle>,
    pub services: Vec<Uuid>,
    pub selected_service: Option<Uuid>,
    pub characteristics: Vec<CharacteristicInfo>,
    pub last_read: Option<String>,
    pub last_write: Option<WriteStatus>,
    /// Reason of the most recent failed connect attempt, cleared when a
    /// new connect is issued
    pub connect_failed: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peripheral_equality_is_by_identity() {
        let a = PeripheralHandle {
            id: "dev-1".into(),
            name: Some("Thermometer".into()),
            address: None,
            rssi: Some(-60),
        };
        let b = PeripheralHandle {
            id: "dev-1".into(),
            name: None,
            address: Some("AA:BB:CC:DD:EE:FF".into()),
            rssi: None,
        };
        assert_eq!(a, b);
    }

    #[test]
    fn phase_is_derived_from_discovery_progress() {
        let handle = PeripheralHandle {
            id: "dev-1".into(),
            name: None,
            address: None,
            rssi: None,
        };
        let mut active = ActiveSession::new(handle.clone());
        assert_eq!(Session::Idle.phase(), Phase::Idle);
        assert_eq!(Session::Connecting(handle).phase(), Phase::Connecting);
        assert_eq!(
            Session::Active(active.clone()).phase(),
            Phase::DiscoveringServices
        );

        let svc = Uuid::from_u128(0x180f);
        active.services = Some(vec![svc]);
        assert_eq!(
            Session::Active(active.clone()).phase(),
            Phase::DiscoveringCharacteristics
        );

        // Characteristics without a selection do not make the session ready
        active.characteristics = Some(vec![]);
        assert_eq!(
            Session::Active(active.clone()).phase(),
            Phase::DiscoveringCharacteristics
        );

        active.selected_service = Some(svc);
        assert_eq!(Session::Active(active).phase(), Phase::Ready);
    }

    #[test]
    fn snapshot_serializes_for_the_frontend() {
        let snapshot = Snapshot {
            adapter_state: AdapterState::PoweredOn,
            scanning: true,
            ..Snapshot::default()
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["adapter_state"], "powered-on");
        assert_eq!(json["scanning"], true);
    }
}

//! Radio backend driving a real adapter through the bluest crate.
//!
//! Every [`RadioLink`] request spawns a task that performs the bluest
//! call and reports the outcome as a [`RadioEvent`]; the session
//! manager on the other end of the channel is the only place that
//! state changes. Handles to devices, services and characteristics are
//! cached here, keyed by the identifiers the manager works with.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bluest::{Adapter, Characteristic, ConnectionEvent, Device, Service};
use futures_util::StreamExt;
use log::{debug, error, info};
use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::RadioError;
use crate::radio::RadioLink;
use crate::session::{AdapterState, CharacteristicProps, RadioEvent};

pub struct BluestRadio {
    adapter: Adapter,
    events: mpsc::Sender<RadioEvent>,
    devices: Arc<Mutex<HashMap<String, Device>>>,
    services: Arc<Mutex<HashMap<Uuid, Service>>>,
    characteristics: Arc<Mutex<HashMap<Uuid, Characteristic>>>,
    scan_cancel: Mutex<Option<CancellationToken>>,
    notify_cancel: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl BluestRadio {
    /// Waits for the platform adapter and reports it powered on.
    ///
    /// bluest only exposes available/unavailable, so the finer adapter
    /// states never occur with this backend.
    pub async fn new(events: mpsc::Sender<RadioEvent>) -> anyhow::Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow::anyhow!("No Bluetooth adapter found"))?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available");
        emit(&events, RadioEvent::AdapterStateChanged(AdapterState::PoweredOn)).await;
        Ok(Self {
            adapter,
            events,
            devices: Arc::new(Mutex::new(HashMap::new())),
            services: Arc::new(Mutex::new(HashMap::new())),
            characteristics: Arc::new(Mutex::new(HashMap::new())),
            scan_cancel: Mutex::new(None),
            notify_cancel: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn device(&self, id: &str) -> Result<Device, RadioError> {
        self.devices
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| RadioError::PeripheralNotFound(id.to_string()))
    }

    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, RadioError> {
        self.characteristics
            .lock()
            .unwrap()
            .get(&uuid)
            .cloned()
            .ok_or(RadioError::CharacteristicNotResolved(uuid))
    }

    /// Watches the platform connection events of one device and
    /// reports link loss.
    fn watch_connection(&self, id: String, device: Device) {
        let adapter = self.adapter.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut stream = match adapter.device_connection_events(&device).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Cannot watch connection events for {}: {}", id, e);
                    return;
                }
            };
            while let Some(event) = stream.next().await {
                if matches!(event, ConnectionEvent::Disconnected) {
                    info!("Link to {} lost", id);
                    emit(
                        &events,
                        RadioEvent::Disconnected {
                            id: id.clone(),
                            reason: None,
                        },
                    )
                    .await;
                    break;
                }
            }
        });
    }
}

#[async_trait::async_trait]
impl RadioLink for BluestRadio {
    async fn start_scan(&self) -> Result<(), RadioError> {
        let cancel = CancellationToken::new();
        if let Some(previous) = self.scan_cancel.lock().unwrap().replace(cancel.clone()) {
            previous.cancel();
        }

        let adapter = self.adapter.clone();
        let devices = self.devices.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            info!("Starting bluetooth scan");
            let mut stream = match adapter.scan(&[]).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Failed to start scan: {}", e);
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    discovered = stream.next() => match discovered {
                        Some(discovered) => {
                            let device = discovered.device;
                            let id = device.id().to_string();
                            let name = device.name().ok();
                            debug!("Advertisement from {} ({:?})", id, name);
                            devices.lock().unwrap().insert(id.clone(), device);
                            emit(&events, RadioEvent::PeripheralDiscovered {
                                address: extract_mac_address(&id),
                                id,
                                name,
                                rssi: discovered.rssi,
                            }).await;
                        }
                        None => {
                            info!("Bluetooth scan stream has ended");
                            break;
                        }
                    }
                }
            }
        });
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        if let Some(cancel) = self.scan_cancel.lock().unwrap().take() {
            info!("Stopping bluetooth scan");
            cancel.cancel();
        }
        Ok(())
    }

    async fn connect(&self, id: &str) -> Result<(), RadioError> {
        let device = self.device(id)?;
        let adapter = self.adapter.clone();
        let events = self.events.clone();
        let id = id.to_string();
        self.watch_connection(id.clone(), device.clone());
        tokio::spawn(async move {
            info!("Initiating connection to {}", id);
            match adapter.connect_device(&device).await {
                Ok(()) => {
                    info!("Connected to {}", id);
                    emit(&events, RadioEvent::Connected { id }).await;
                }
                Err(e) => {
                    emit(
                        &events,
                        RadioEvent::ConnectFailed {
                            id,
                            reason: e.to_string(),
                        },
                    )
                    .await;
                }
            }
        });
        Ok(())
    }

    async fn disconnect(&self, id: &str) -> Result<(), RadioError> {
        let device = self.device(id)?;
        let adapter = self.adapter.clone();
        let events = self.events.clone();
        let id = id.to_string();
        self.services.lock().unwrap().clear();
        self.characteristics.lock().unwrap().clear();
        for (_, cancel) in self.notify_cancel.lock().unwrap().drain() {
            cancel.cancel();
        }
        tokio::spawn(async move {
            match adapter.disconnect_device(&device).await {
                Ok(()) => {
                    info!("Disconnected from {}", id);
                    emit(&events, RadioEvent::Disconnected { id, reason: None }).await;
                }
                Err(e) => error!("Failed to disconnect from {}: {}", id, e),
            }
        });
        Ok(())
    }

    async fn discover_services(&self, id: &str) -> Result<(), RadioError> {
        let device = self.device(id)?;
        let services = self.services.clone();
        let events = self.events.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            match device.services().await {
                Ok(discovered) => {
                    let mut uuids = Vec::with_capacity(discovered.len());
                    let mut map = services.lock().unwrap();
                    for service in discovered {
                        uuids.push(service.uuid());
                        map.insert(service.uuid(), service);
                    }
                    drop(map);
                    emit(
                        &events,
                        RadioEvent::ServicesDiscovered {
                            id,
                            services: uuids,
                            error: None,
                        },
                    )
                    .await;
                }
                Err(e) => {
                    emit(
                        &events,
                        RadioEvent::ServicesDiscovered {
                            id,
                            services: Vec::new(),
                            error: Some(e.to_string()),
                        },
                    )
                    .await;
                }
            }
        });
        Ok(())
    }

    async fn discover_characteristics(&self, _id: &str, service: Uuid) -> Result<(), RadioError> {
        let handle = self
            .services
            .lock()
            .unwrap()
            .get(&service)
            .cloned()
            .ok_or(RadioError::ServiceNotResolved(service))?;
        let characteristics = self.characteristics.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            match handle.characteristics().await {
                Ok(discovered) => {
                    let mut infos = Vec::with_capacity(discovered.len());
                    for characteristic in discovered {
                        let props = match characteristic.properties().await {
                            Ok(p) => CharacteristicProps {
                                read: p.read,
                                write: p.write,
                                write_without_response: p.write_without_response,
                                notify: p.notify,
                                indicate: p.indicate,
                            },
                            Err(e) => {
                                debug!(
                                    "No properties for {}: {}",
                                    characteristic.uuid(),
                                    e
                                );
                                CharacteristicProps::default()
                            }
                        };
                        infos.push(crate::session::CharacteristicInfo {
                            uuid: characteristic.uuid(),
                            props,
                        });
                        characteristics
                            .lock()
                            .unwrap()
                            .insert(characteristic.uuid(), characteristic);
                    }
                    emit(
                        &events,
                        RadioEvent::CharacteristicsDiscovered {
                            service,
                            characteristics: infos,
                            error: None,
                        },
                    )
                    .await;
                }
                Err(e) => {
                    emit(
                        &events,
                        RadioEvent::CharacteristicsDiscovered {
                            service,
                            characteristics: Vec::new(),
                            error: Some(e.to_string()),
                        },
                    )
                    .await;
                }
            }
        });
        Ok(())
    }

    async fn read_characteristic(&self, characteristic: Uuid) -> Result<(), RadioError> {
        let handle = self.characteristic(characteristic)?;
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match handle.read().await {
                Ok(value) => RadioEvent::ValueUpdated {
                    characteristic,
                    value,
                    error: None,
                },
                Err(e) => RadioEvent::ValueUpdated {
                    characteristic,
                    value: Vec::new(),
                    error: Some(e.to_string()),
                },
            };
            emit(&events, event).await;
        });
        Ok(())
    }

    async fn write_characteristic(
        &self,
        characteristic: Uuid,
        payload: Vec<u8>,
    ) -> Result<(), RadioError> {
        let handle = self.characteristic(characteristic)?;
        let events = self.events.clone();
        tokio::spawn(async move {
            let error = handle.write(&payload).await.err().map(|e| e.to_string());
            emit(
                &events,
                RadioEvent::WriteCompleted {
                    characteristic,
                    error,
                },
            )
            .await;
        });
        Ok(())
    }

    async fn set_notify(&self, characteristic: Uuid, enabled: bool) -> Result<(), RadioError> {
        if !enabled {
            // Dropping the notification stream unsubscribes
            if let Some(cancel) = self.notify_cancel.lock().unwrap().remove(&characteristic) {
                info!("Unsubscribing from {}", characteristic);
                cancel.cancel();
            }
            emit(
                &self.events,
                RadioEvent::NotifyStateChanged {
                    characteristic,
                    error: None,
                },
            )
            .await;
            return Ok(());
        }

        let handle = self.characteristic(characteristic)?;
        let events = self.events.clone();
        let cancel = CancellationToken::new();
        if let Some(previous) = self
            .notify_cancel
            .lock()
            .unwrap()
            .insert(characteristic, cancel.clone())
        {
            previous.cancel();
        }
        tokio::spawn(async move {
            info!("Subscribing to notifications from {}", characteristic);
            let mut stream = match handle.notify().await {
                Ok(stream) => stream,
                Err(e) => {
                    emit(
                        &events,
                        RadioEvent::NotifyStateChanged {
                            characteristic,
                            error: Some(e.to_string()),
                        },
                    )
                    .await;
                    return;
                }
            };
            emit(
                &events,
                RadioEvent::NotifyStateChanged {
                    characteristic,
                    error: None,
                },
            )
            .await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    value = stream.next() => match value {
                        Some(Ok(value)) => {
                            emit(&events, RadioEvent::ValueUpdated {
                                characteristic,
                                value,
                                error: None,
                            }).await;
                        }
                        Some(Err(e)) => {
                            error!("Notification stream error on {}: {}", characteristic, e);
                            break;
                        }
                        None => break,
                    }
                }
            }
            info!("Notification stream for {} ended", characteristic);
        });
        Ok(())
    }
}

async fn emit(events: &mpsc::Sender<RadioEvent>, event: RadioEvent) {
    if let Err(e) = events.send(event).await {
        error!("Failed to deliver radio event: {}", e);
    }
}

fn extract_mac_address(device_id: &str) -> Option<String> {
    let re = Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").ok()?;
    re.find_iter(device_id)
        .last()
        .map(|m| m.as_str().to_uppercase())
}

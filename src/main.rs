//! Command-line explorer for the session manager, driving a real
//! adapter through the bluest backend.
//!
//! Scans for a few seconds and lists what it found; with a name
//! fragment as argument it connects to the first match, walks the
//! first discovered service, and prints the session snapshot as JSON.

use std::time::Duration;

use anyhow::{anyhow, Result};
use log::info;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use ble_explorer::constants::service_name;
use ble_explorer::radio::bluest_link::BluestRadio;
use ble_explorer::{Phase, SessionHandle};

const SCAN_DURATION: Duration = Duration::from_secs(8);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

#[tokio::main]
async fn main() -> Result<()> {
    ble_explorer::init_logging();
    let target = std::env::args().nth(1);

    let (events_tx, events_rx) = mpsc::channel(64);
    let radio = BluestRadio::new(events_tx).await?;
    let session = SessionHandle::spawn(radio, events_rx);

    session.start_scanning();
    sleep(SCAN_DURATION).await;
    session.stop_scanning();

    let discovered = session.snapshot().discovered;
    info!("Scan finished, {} peripherals", discovered.len());
    for peripheral in &discovered {
        println!(
            "{}  {}  rssi {}",
            peripheral.id,
            peripheral.name.as_deref().unwrap_or("(unnamed)"),
            peripheral
                .rssi
                .map(|r| r.to_string())
                .unwrap_or_else(|| "?".into()),
        );
    }

    let Some(fragment) = target else {
        session.shutdown();
        return Ok(());
    };

    let peripheral = discovered
        .iter()
        .find(|p| {
            p.name
                .as_deref()
                .is_some_and(|name| name.contains(fragment.as_str()))
        })
        .ok_or_else(|| anyhow!("No discovered peripheral matching {:?}", fragment))?;
    info!("Connecting to {}", peripheral.id);
    session.connect(peripheral.id.clone());

    let mut watch = session.watch();
    // The connect command is fire-and-forget; the current snapshot is
    // still the post-scan Idle one, so wait for the attempt to start
    // before treating Idle as a failed connection.
    timeout(CONNECT_TIMEOUT, watch.wait_for(|s| s.phase == Phase::Connecting)).await??;
    let snapshot = timeout(
        CONNECT_TIMEOUT,
        watch.wait_for(|s| {
            s.phase == Phase::DiscoveringCharacteristics || s.phase == Phase::Idle
        }),
    )
    .await??
    .clone();
    if snapshot.phase == Phase::Idle {
        return Err(anyhow!(
            "Connection failed: {}",
            snapshot.connect_failed.as_deref().unwrap_or("link lost")
        ));
    }

    println!("Services:");
    for service in &snapshot.services {
        match service_name(*service) {
            Some(name) => println!("  {}  ({})", service, name),
            None => println!("  {}", service),
        }
    }

    if let Some(first) = snapshot.services.first().copied() {
        session.select_service(first);
        let ready = timeout(CONNECT_TIMEOUT, watch.wait_for(|s| s.phase == Phase::Ready))
            .await??
            .clone();
        println!("{}", serde_json::to_string_pretty(&ready)?);
    }

    session.disconnect();
    session.shutdown();
    Ok(())
}

//! Basic example: Discover nearby Pokit meters
//!
//! Run with: cargo run --example discover_meters

use pokit_ble::{Config, DeviceManager, EngineEvent, Result};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pokit_ble=debug".parse().unwrap()),
        )
        .init();

    let config = Config::default().with_scan_duration(Duration::from_secs(15));
    let scan_duration = config.scan_duration;

    println!("Starting meter discovery...");

    let manager = DeviceManager::new(config).await?;

    let _handle = manager.on_peripheral_discovered(|meter| {
        println!("\nDiscovered meter:");
        println!("  Name: {}", meter.name);
        println!("  ID: {}", meter.id);
        println!("  RSSI: {:?} dBm", meter.rssi);
        println!("  Last seen: {}", meter.last_seen.format("%H:%M:%S"));
    });

    let mut events = manager.subscribe();
    manager.start_scan();

    println!("Scanning for {} seconds...", scan_duration.as_secs());
    println!("Press Ctrl+C to exit early.\n");

    // The scan stops by itself once the duration elapses
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(EngineEvent::ScanStopped) | Err(_) => break,
                Ok(_) => {}
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\nInterrupted!");
                break;
            }
        }
    }

    println!("\n--- Scan Complete ---");
    let meters = manager.discovered_peripherals();
    println!("Total meters found: {}", meters.len());

    for meter in meters {
        println!("  {} - {} (RSSI: {:?})", meter.name, meter.id, meter.rssi);
    }

    manager.shutdown().await;
    println!("\nDone!");

    Ok(())
}

//! Multimeter example: Connect to the nearest meter and print readings
//!
//! Run with: cargo run --example multimeter_monitor

use pokit_ble::{
    Config, ConnectionState, DeviceManager, DiscoveryState, EngineEvent, MultimeterMode, Result,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pokit_ble=info".parse().unwrap()),
        )
        .init();

    let manager = DeviceManager::new(Config::default().with_multimeter_update_interval(500)).await?;
    let mut events = manager.subscribe();

    println!("Scanning for 5 seconds...");
    manager.start_scan();
    tokio::time::sleep(Duration::from_secs(5)).await;

    let Some(meter) = manager.nearest_peripheral() else {
        println!("No meters found");
        manager.shutdown().await;
        return Ok(());
    };

    println!("Connecting to {} ({})...", meter.name, meter.id);
    manager.connect(&meter.id)?;

    let _readings = manager.on_multimeter_updated(|display| {
        if display.active {
            println!(
                "{:>10.4} {} [{}]{}{}",
                display.value,
                display.mode_label,
                display.range_label,
                if display.flags.autorange { " auto" } else { "" },
                if display.flags.error { " error" } else { "" }
            );
        } else {
            println!("  (no readings)");
        }
    });

    println!("Press Ctrl+C to exit.\n");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(EngineEvent::DiscoveryProgress(DiscoveryState::Ready)) => {
                    println!("Meter ready, measuring DC voltage");
                    manager.select_multimeter_mode(MultimeterMode::DcVoltage);
                }
                Ok(EngineEvent::Status(status)) => {
                    println!(
                        "Status: {}, battery {:.0}%, switch {}",
                        status.state_label,
                        status.battery_fraction * 100.0,
                        status.mode_switch_label
                    );
                }
                Ok(EngineEvent::DeviceInfo(details)) => {
                    println!("Firmware {} ({})", details.firmware, details.mac_address);
                }
                Ok(EngineEvent::ConnectionChanged { state, .. })
                    if state == ConnectionState::Disconnected =>
                {
                    println!("Disconnected");
                    break;
                }
                Ok(_) => {}
                Err(e) => println!("Event stream error: {}", e),
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\nInterrupted!");
                break;
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}

//! Oscilloscope example: Capture a DC voltage waveform
//!
//! Run with: cargo run --example scope_capture

use pokit_ble::{
    Config, DeviceManager, DiscoveryState, DsoCommand, DsoMode, EngineEvent, Range, Result,
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

    let config = Config::default()
        .with_dso_window(50_000)
        .with_dso_samples(500)
        .with_dso_trigger_level(1.0);
    let manager = DeviceManager::new(config).await?;
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

    let capture = async {
        loop {
            match events.recv().await {
                Ok(EngineEvent::DiscoveryProgress(DiscoveryState::Ready)) => {
                    manager.select_dso_mode(DsoMode::Vdc)?;
                    manager.select_dso_range(Range(2))?;
                    manager.select_dso_command(DsoCommand::RisingEdge);
                    manager.start_oscilloscope();
                    println!("Acquisition started, waiting for trigger...");
                }
                Ok(EngineEvent::Scope(scope)) => {
                    println!(
                        "Capture: {} samples at {} Hz, {} {}, {:.3} ms/div",
                        scope.samples,
                        scope.sampling_rate,
                        scope.mode_label,
                        scope.range_label,
                        scope.ms_per_division
                    );
                }
                Ok(EngineEvent::SizeMismatch { received, capacity }) => {
                    println!("Oversized reading: {} bytes (capacity {})", received, capacity);
                }
                Ok(EngineEvent::Acquiring(false)) => {
                    // Data stopped arriving, the capture is complete
                    break;
                }
                Ok(_) => {}
                Err(e) => println!("Event stream error: {}", e),
            }
        }
        Ok::<(), pokit_ble::Error>(())
    };

    tokio::select! {
        result = capture => result?,
        _ = tokio::time::sleep(Duration::from_secs(60)) => println!("Timed out"),
        _ = tokio::signal::ctrl_c() => println!("\nInterrupted!"),
    }

    manager.stop_oscilloscope();

    let samples = manager.waveform();
    println!("\nCaptured {} samples", samples.len());
    if let (Some(min), Some(max)) = (
        samples.iter().copied().reduce(f32::min),
        samples.iter().copied().reduce(f32::max),
    ) {
        println!("  Min: {:.4}", min);
        println!("  Max: {:.4}", max);
    }

    manager.shutdown().await;
    Ok(())
}

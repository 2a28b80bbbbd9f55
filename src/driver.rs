use std::time::Duration;
use tokio::{select, time};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::device::RemoteDevice;
use crate::handler::DeviceHandler;

/// Starts the device (if it is not started yet) and ticks it at a fixed interval until
///  `shutdown` turns true or its sender is dropped. The device is stopped and handed back
///  on shutdown.
///
/// The device is not `Send`, so this future must be awaited on the task that owns it rather
///  than spawned.
pub async fn run_device<H: DeviceHandler>(mut device: RemoteDevice<H>, tick_interval: Duration, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<RemoteDevice<H>> {
    if !device.is_started() {
        device.start()?;
    }

    let mut ticks = time::interval(tick_interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    if !*shutdown.borrow() {
        loop {
            select! {
                _ = ticks.tick() => {
                    let now = device.now();
                    device.tick(now);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("shutdown sender was dropped");
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    info!("shutting down device {:x}", device.identity().device_id);
    device.stop();
    Ok(device)
}

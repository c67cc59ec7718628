use std::sync::{mpsc, Arc};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::device_controller::device_registry::DeviceRegistry;
use crate::entity::dto::device_event_dto::DeviceEventDto;
use crate::{info, warn};

const LOG_TAG: &str = "heartbeating_thread";

/// device heartbeating thread
/// send a status line per device to the operator log at a regular interval
pub fn heartbeating_thread(
    beat_interval: Duration,
    registry: Arc<DeviceRegistry>,
    event_tx: mpsc::Sender<DeviceEventDto>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(LOG_TAG, "heartbeating thread starting");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(beat_interval) => {}
            }
            for message in status_lines(&registry) {
                if event_tx.send(message).is_err() {
                    warn!(LOG_TAG, "event receiver dropped, heartbeat skipped");
                }
            }
        }
        info!(LOG_TAG, "heartbeating thread stopped");
    })
}

/// one log event per device describing what the last poll saw
pub fn status_lines(registry: &DeviceRegistry) -> Vec<DeviceEventDto> {
    let mut lines = Vec::new();
    for device_id in registry.device_ids() {
        let (device, status) = match (registry.get(device_id), registry.status(device_id)) {
            (Ok(device), Ok(status)) => (device, status),
            _ => continue,
        };
        let message = match status.display_values(device.calibration_offset) {
            Some((current_db, default_db)) => format!(
                "status: connected (IP: {}), current {} dB, default {} dB, checkback {}",
                device.address,
                current_db,
                default_db,
                if status.snapshot.checkback { "ok" } else { "failed" }
            ),
            None => format!("status: disconnected (IP: {})", device.address),
        };
        lines.push(DeviceEventDto::log(Some(device_id), message));
    }
    lines
}

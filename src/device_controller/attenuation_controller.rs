//! attenuation controller, the entry point the presentation layer calls
//! - validates the requested value before any io
//! - hands the write to the device's writing worker and waits for the result

use std::collections::HashMap;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use tokio::sync::{mpsc as async_mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::device_registry::DeviceRegistry;
use super::workers::writing_thread::DeviceWriter;
use crate::common::error::DriverError;
use crate::driver::modbus::codec;
use crate::driver::modbus::prelude::DeviceId;
use crate::driver::modbus::traits::DeviceLink;
use crate::entity::dto::device_command_dto::{CommandOperation, CommandOutcome, DeviceCommandDto};
use crate::entity::dto::device_event_dto::DeviceEventDto;
use crate::debug;

const LOG_TAG: &str = "attenuation_controller";

#[derive(Clone)]
pub struct AttenuationController {
    registry: Arc<DeviceRegistry>,
    command_txs: Arc<HashMap<DeviceId, async_mpsc::UnboundedSender<DeviceCommandDto>>>,
}

impl AttenuationController {
    /// spawn one writing worker per registered device
    pub fn start(
        registry: Arc<DeviceRegistry>,
        link: Arc<dyn DeviceLink>,
        event_tx: mpsc::Sender<DeviceEventDto>,
        write_timeout: Duration,
        shutdown: CancellationToken,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let mut command_txs = HashMap::new();
        let mut handles = Vec::new();
        for device_id in registry.device_ids() {
            let (tx, rx) = async_mpsc::unbounded_channel();
            let writer = DeviceWriter::new(
                device_id,
                registry.clone(),
                link.clone(),
                event_tx.clone(),
                write_timeout,
            );
            handles.push(writer.start(rx, shutdown.clone()));
            command_txs.insert(device_id, tx);
        }
        let controller = AttenuationController {
            registry,
            command_txs: Arc::new(command_txs),
        };
        (controller, handles)
    }

    /// write the live attenuation, `target_db` includes the calibration offset
    pub async fn set_current(&self, device_id: DeviceId, target_db: f64) -> Result<CommandOutcome, DriverError> {
        self.submit(device_id, CommandOperation::SetCurrent, target_db).await
    }

    /// write the power-on default bank
    pub async fn set_default(&self, device_id: DeviceId, target_db: f64) -> Result<CommandOutcome, DriverError> {
        self.submit(device_id, CommandOperation::SetDefault, target_db).await
    }

    /// value the current selector should move to, taken from the last poll
    /// no io, the caller applies it through `set_current`
    pub fn restore_default_into_current(&self, device_id: DeviceId) -> Result<Option<f64>, DriverError> {
        let device = self.registry.get(device_id)?;
        let status = self.registry.status(device_id)?;
        Ok(status
            .display_values(device.calibration_offset)
            .map(|(_, default_db)| default_db))
    }

    /// move the current setting by `step` half-dB positions
    /// returns the applied value, None when offline or at the end of the range
    pub async fn step_current(&self, device_id: DeviceId, step: i32) -> Result<Option<f64>, DriverError> {
        let device = self.registry.get(device_id)?;
        let status = self.registry.status(device_id)?;
        let current_raw = match status.snapshot.current_raw_db() {
            Some(raw) if status.is_connected() => raw,
            _ => return Ok(None),
        };
        let next = i32::from(codec::raw_to_index(current_raw)?) + step;
        if !(0..=i32::from(codec::MAX_CODE)).contains(&next) {
            debug!(LOG_TAG, "device {} step {} leaves the range", device_id, step);
            return Ok(None);
        }
        let target_db = codec::to_display(f64::from(next) * codec::STEP_DB, device.calibration_offset);
        match self.set_current(device_id, target_db).await? {
            CommandOutcome::Applied => Ok(Some(target_db)),
            CommandOutcome::SkippedDisconnected => Ok(None),
        }
    }

    async fn submit(
        &self,
        device_id: DeviceId,
        operation: CommandOperation,
        target_db: f64,
    ) -> Result<CommandOutcome, DriverError> {
        // reject bad values before anything is queued
        let device = self.registry.get(device_id)?;
        codec::encode(codec::to_raw(target_db, device.calibration_offset))?;

        let tx = self
            .command_txs
            .get(&device_id)
            .ok_or(DriverError::DeviceNotFound(device_id))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(DeviceCommandDto {
            device_id,
            operation,
            target_db,
            reply_tx,
        })
        .map_err(|e| DriverError::ChannelError(format!("writer of device {} stopped: {}", device_id, e)))?;
        reply_rx
            .await
            .map_err(|e| DriverError::ChannelError(format!("writer of device {} dropped the command: {}", device_id, e)))?
    }
}

//! per-device writing worker
//! commands are handled one at a time in the order they were sent,
//! each under the same io lock the poller uses

use std::sync::{mpsc, Arc};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::common::error::DriverError;
use crate::device_controller::device_registry::DeviceRegistry;
use crate::driver::modbus::codec;
use crate::driver::modbus::prelude::*;
use crate::driver::modbus::traits::DeviceLink;
use crate::entity::dto::device_command_dto::{CommandOperation, CommandOutcome, DeviceCommandDto};
use crate::entity::dto::device_event_dto::DeviceEventDto;
use crate::{debug, error, info, warn};

const LOG_TAG: &str = "writing_thread";

pub struct DeviceWriter {
    device_id: DeviceId,
    registry: Arc<DeviceRegistry>,
    link: Arc<dyn DeviceLink>,
    event_tx: mpsc::Sender<DeviceEventDto>,
    write_timeout: Duration,
}

impl DeviceWriter {
    pub fn new(
        device_id: DeviceId,
        registry: Arc<DeviceRegistry>,
        link: Arc<dyn DeviceLink>,
        event_tx: mpsc::Sender<DeviceEventDto>,
        write_timeout: Duration,
    ) -> Self {
        DeviceWriter {
            device_id,
            registry,
            link,
            event_tx,
            write_timeout,
        }
    }

    /// run until the command channel closes or shutdown is requested
    pub fn start(
        self,
        mut command_rx: UnboundedReceiver<DeviceCommandDto>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(LOG_TAG, "writer of device {} starting", self.device_id);
            loop {
                let command = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    command = command_rx.recv() => command,
                };
                let Some(command) = command else {
                    break;
                };
                let result = self.execute(command.operation, command.target_db).await;
                if command.reply_tx.send(result).is_err() {
                    debug!(LOG_TAG, "device {} caller went away before the reply", self.device_id);
                }
            }
            info!(LOG_TAG, "writer of device {} stopped", self.device_id);
        })
    }

    /// write one bank, a link failure is reported once and not retried
    pub async fn execute(
        &self,
        operation: CommandOperation,
        target_db: f64,
    ) -> Result<CommandOutcome, DriverError> {
        let slot = self.registry.slot(self.device_id)?;
        let _io_guard = slot.lock_io().await;

        if !slot.status().is_connected() {
            debug!(LOG_TAG, "device {} offline, {} to {} dB skipped", self.device_id, operation, target_db);
            return Ok(CommandOutcome::SkippedDisconnected);
        }

        let device = slot.config();
        let bits = codec::encode(codec::to_raw(target_db, device.calibration_offset))?;

        match self.write_bits(&device.address, operation.coil_addr(), &bits).await {
            Ok(()) => {
                info!(LOG_TAG, "device {} {} to {} dB, coils: {:?}", self.device_id, operation, target_db, bits);
                let message = match operation {
                    CommandOperation::SetCurrent => format!("attenuation set: {} dB", target_db),
                    CommandOperation::SetDefault => format!("default attenuation set: {} dB", target_db),
                };
                self.send(DeviceEventDto::log(Some(self.device_id), message));
                Ok(CommandOutcome::Applied)
            }
            Err(cause) => {
                error!(LOG_TAG, "device {} {} failed: {}", self.device_id, operation, cause);
                self.send(DeviceEventDto::CommandFailed {
                    device_id: self.device_id,
                    operation,
                    cause: cause.to_string(),
                });
                Err(DriverError::CommandFailed {
                    device_id: self.device_id,
                    operation,
                    cause: Box::new(cause),
                })
            }
        }
    }

    async fn write_bits(&self, address: &str, start_addr: ModbusAddrSize, bits: &CoilBits) -> Result<(), DriverError> {
        let mut session = self.link.open(address, self.write_timeout).await?;
        let result = session.write_multiple_coils(start_addr, bits).await;
        if let Err(e) = session.close().await {
            debug!(LOG_TAG, "device {} session close failed: {}", self.device_id, e);
        }
        result
    }

    fn send(&self, event: DeviceEventDto) {
        if let Err(e) = self.event_tx.send(event) {
            warn!(LOG_TAG, "device {} event receiver dropped: {}", self.device_id, e);
        }
    }
}

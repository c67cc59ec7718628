//! device polling worker, one per attenuator
//! - open a fresh session, read 12 coils and the 6 discrete input readback, close
//! - every failure is reported as disconnected and retried on the same cadence
//! - never stops on its own, only the shutdown token ends the loop

use std::sync::{mpsc, Arc};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::common::error::DriverError;
use crate::common::setting::Modbus;
use crate::device_controller::device_registry::DeviceRegistry;
use crate::device_controller::entity::device_po::DevicePo;
use crate::driver::modbus::codec;
use crate::driver::modbus::entity::*;
use crate::driver::modbus::prelude::DeviceId;
use crate::driver::modbus::traits::{DeviceLink, LinkSession};
use crate::entity::dto::device_event_dto::DeviceEventDto;
use crate::{debug, error, info, warn};

const LOG_TAG: &str = "polling_thread";

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    // pause after every iteration, success or not
    pub interval: Duration,
    pub read_timeout: Duration,
}

impl From<&Modbus> for PollerConfig {
    fn from(modbus: &Modbus) -> Self {
        PollerConfig {
            interval: modbus.poll_interval(),
            read_timeout: modbus.read_timeout(),
        }
    }
}

pub struct DevicePoller {
    device_id: DeviceId,
    registry: Arc<DeviceRegistry>,
    link: Arc<dyn DeviceLink>,
    event_tx: mpsc::Sender<DeviceEventDto>,
    config: PollerConfig,
}

impl DevicePoller {
    pub fn new(
        device_id: DeviceId,
        registry: Arc<DeviceRegistry>,
        link: Arc<dyn DeviceLink>,
        event_tx: mpsc::Sender<DeviceEventDto>,
        config: PollerConfig,
    ) -> Self {
        DevicePoller {
            device_id,
            registry,
            link,
            event_tx,
            config,
        }
    }

    /// move the poller into its own task
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run_loop(shutdown).await })
    }

    pub async fn run_loop(&self, shutdown: CancellationToken) {
        info!(LOG_TAG, "poller of device {} starting, interval: {:?}", self.device_id, self.config.interval);
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            self.poll_iteration().await;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
        info!(LOG_TAG, "poller of device {} stopped", self.device_id);
    }

    /// one open -> read -> close cycle, returns what was published
    pub async fn poll_iteration(&self) -> CoilSnapshot {
        let slot = match self.registry.slot(self.device_id) {
            Ok(slot) => slot,
            Err(e) => {
                error!(LOG_TAG, "cannot poll: {}", e);
                return CoilSnapshot::disconnected();
            }
        };

        let (device, result) = {
            let _io_guard = slot.lock_io().await;
            // config is read once under the io lock, the whole cycle uses this copy
            let device = slot.config();
            let result = self.read_snapshot(&device.address).await;
            (device, result)
        };

        match result {
            Ok(snapshot) => {
                self.publish_connected(&device, snapshot);
                snapshot
            }
            Err(e) => {
                debug!(LOG_TAG, "device {} poll failed: {}", self.device_id, e);
                self.publish_disconnected(&device);
                CoilSnapshot::disconnected()
            }
        }
    }

    /// the whole open -> read -> close cycle shares one read timeout
    async fn read_snapshot(&self, address: &str) -> Result<CoilSnapshot, DriverError> {
        let deadline = self.config.read_timeout;
        let cycle = async {
            let mut session = self.link.open(address, deadline).await?;
            let result = read_coil_state(session.as_mut()).await;
            if let Err(e) = session.close().await {
                debug!(LOG_TAG, "device {} session close failed: {}", self.device_id, e);
            }
            result
        };
        tokio::time::timeout(deadline, cycle).await.unwrap_or_else(|_| {
            Err(DriverError::Unreachable(format!(
                "poll cycle of {} exceeded {} ms",
                address,
                deadline.as_millis()
            )))
        })
    }

    fn publish_connected(&self, device: &DevicePo, snapshot: CoilSnapshot) {
        let previous = self.record(snapshot);
        if previous != Some(true) {
            self.send(DeviceEventDto::ConnectivityChanged {
                device_id: self.device_id,
                connected: true,
            });
            info!(LOG_TAG, "device {} connected, address: {}", self.device_id, device.address);
            self.send(DeviceEventDto::log(
                Some(self.device_id),
                format!("connection established (IP: {})", device.address),
            ));
        }
        if !snapshot.checkback {
            warn!(LOG_TAG, "device {} checkback mismatch, coils: {:?}", self.device_id, snapshot.current_bits);
        }
        self.send(DeviceEventDto::StateObserved {
            device_id: self.device_id,
            current_db: codec::to_display(codec::decode(&snapshot.current_bits), device.calibration_offset),
            default_db: codec::to_display(codec::decode(&snapshot.default_bits), device.calibration_offset),
            checkback_ok: snapshot.checkback,
        });
    }

    fn publish_disconnected(&self, device: &DevicePo) {
        let previous = self.record(CoilSnapshot::disconnected());
        self.send(DeviceEventDto::ConnectivityChanged {
            device_id: self.device_id,
            connected: false,
        });
        if previous == Some(true) {
            warn!(LOG_TAG, "device {} lost, address: {}", self.device_id, device.address);
            self.send(DeviceEventDto::log(
                Some(self.device_id),
                format!("connection lost (IP: {})", device.address),
            ));
        }
    }

    fn record(&self, snapshot: CoilSnapshot) -> Option<bool> {
        match self.registry.record_snapshot(self.device_id, snapshot) {
            Ok(previous) => previous,
            Err(e) => {
                error!(LOG_TAG, "cannot record snapshot: {}", e);
                None
            }
        }
    }

    fn send(&self, event: DeviceEventDto) {
        if let Err(e) = self.event_tx.send(event) {
            warn!(LOG_TAG, "device {} event receiver dropped: {}", self.device_id, e);
        }
    }
}

/// coils 0..12 plus the readback of coils 0..6
async fn read_coil_state(session: &mut dyn LinkSession) -> Result<CoilSnapshot, DriverError> {
    let coils = session.read_coils(CURRENT_COIL_ADDR, COIL_NUM).await?;
    let readback = session
        .read_discrete_inputs(CHECKBACK_INPUT_ADDR, CHECKBACK_INPUT_NUM)
        .await?;
    CoilSnapshot::from_reads(&coils, &readback)
}

//! 设备注册表
//! - holds the configured attenuators, created once at startup and never removed
//! - address and calibration offset are copied out per operation
//! - owns the per-device io lock shared by the poller and the writer

use std::collections::BTreeMap;
use std::sync::{mpsc, Arc, Mutex, RwLock};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use super::entity::device_po::{DevicePo, DeviceStatus};
use crate::common::error::DriverError;
use crate::driver::modbus::entity::CoilSnapshot;
use crate::driver::modbus::modbus_link::parse_ipv4;
use crate::driver::modbus::prelude::DeviceId;
use crate::entity::dto::device_event_dto::DeviceEventDto;
use crate::{info, warn};

const LOG_TAG: &str = "device_registry";

pub struct DeviceSlot {
    config: RwLock<DevicePo>,
    status: Mutex<DeviceStatus>,
    // at most one modbus session per device at a time, fifo
    io_lock: AsyncMutex<()>,
}

impl DeviceSlot {
    fn new(device: DevicePo) -> Self {
        DeviceSlot {
            config: RwLock::new(device),
            status: Mutex::new(DeviceStatus::default()),
            io_lock: AsyncMutex::new(()),
        }
    }

    pub fn config(&self) -> DevicePo {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn status(&self) -> DeviceStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// hold this for the whole open -> operate -> close of one session
    pub async fn lock_io(&self) -> AsyncMutexGuard<'_, ()> {
        self.io_lock.lock().await
    }
}

pub struct DeviceRegistry {
    slots: BTreeMap<DeviceId, Arc<DeviceSlot>>,
    event_tx: Option<mpsc::Sender<DeviceEventDto>>,
}

impl DeviceRegistry {
    pub fn new(
        devices: Vec<DevicePo>,
        event_tx: Option<mpsc::Sender<DeviceEventDto>>,
    ) -> Result<Self, DriverError> {
        let mut slots = BTreeMap::new();
        for device in devices {
            // a bad stored address is kept, the poller reports the device offline
            if let Err(e) = parse_ipv4(&device.address) {
                warn!(LOG_TAG, "device {} configured with {}", device.device_id, e);
            }
            let device_id = device.device_id;
            if slots.insert(device_id, Arc::new(DeviceSlot::new(device))).is_some() {
                return Err(DriverError::ConfigError(format!(
                    "duplicated device id: {}",
                    device_id
                )));
            }
        }
        Ok(DeviceRegistry { slots, event_tx })
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.slots.keys().copied().collect()
    }

    pub fn slot(&self, device_id: DeviceId) -> Result<Arc<DeviceSlot>, DriverError> {
        self.slots
            .get(&device_id)
            .cloned()
            .ok_or(DriverError::DeviceNotFound(device_id))
    }

    /// consistent copy of the device configuration
    pub fn get(&self, device_id: DeviceId) -> Result<DevicePo, DriverError> {
        Ok(self.slot(device_id)?.config())
    }

    /// last status reported by the poller
    pub fn status(&self, device_id: DeviceId) -> Result<DeviceStatus, DriverError> {
        Ok(self.slot(device_id)?.status())
    }

    /// replace the device address, the next poll or write uses it
    pub fn update_address(&self, device_id: DeviceId, new_address: &str) -> Result<(), DriverError> {
        let slot = self.slot(device_id)?;
        let address = parse_ipv4(new_address)?.to_string();
        {
            let mut config = slot.config.write().unwrap_or_else(|e| e.into_inner());
            config.address = address.clone();
        }
        info!(LOG_TAG, "device {} address set to {}", device_id, address);
        self.emit_log(device_id, format!("address set: {}", address));
        Ok(())
    }

    /// parse and store a new calibration offset, returns the parsed value
    pub fn update_calibration_offset(&self, device_id: DeviceId, new_offset: &str) -> Result<f64, DriverError> {
        let slot = self.slot(device_id)?;
        let offset: f64 = new_offset
            .trim()
            .parse()
            .map_err(|_| DriverError::InvalidValue(format!("'{}' is not a number", new_offset)))?;
        if !offset.is_finite() {
            return Err(DriverError::InvalidValue(format!("'{}' is not a finite number", new_offset)));
        }
        {
            let mut config = slot.config.write().unwrap_or_else(|e| e.into_inner());
            config.calibration_offset = offset;
        }
        info!(LOG_TAG, "device {} calibration offset set to {} dB", device_id, offset);
        self.emit_log(device_id, format!("calibration offset set: {} dB", offset));
        Ok(offset)
    }

    /// store a poll result, returns the connectivity known before it
    pub(crate) fn record_snapshot(&self, device_id: DeviceId, snapshot: CoilSnapshot) -> Result<Option<bool>, DriverError> {
        let slot = self.slot(device_id)?;
        let mut status = slot.status.lock().unwrap_or_else(|e| e.into_inner());
        let previous = status.connected;
        status.connected = Some(snapshot.connected);
        status.snapshot = snapshot;
        Ok(previous)
    }

    fn emit_log(&self, device_id: DeviceId, message: String) {
        if let Some(tx) = &self.event_tx {
            if tx.send(DeviceEventDto::log(Some(device_id), message)).is_err() {
                warn!(LOG_TAG, "event receiver dropped, log event lost");
            }
        }
    }
}

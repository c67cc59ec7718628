use serde::{Deserialize, Serialize};

use crate::common::setting::DeviceSetting;
use crate::driver::modbus::codec;
use crate::driver::modbus::entity::CoilSnapshot;
use crate::driver::modbus::prelude::DeviceId;

/// 配置对象：衰减器模块
/// copied out of the registry for every poll or write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevicePo {
    // 设备 id
    pub device_id: DeviceId,
    // IPv4 literal
    pub address: String,
    // dB added to the raw 0..=31.5 range
    pub calibration_offset: f64,
}

impl From<&DeviceSetting> for DevicePo {
    fn from(setting: &DeviceSetting) -> Self {
        DevicePo {
            device_id: setting.id,
            address: setting.address.clone(),
            calibration_offset: setting.calibration_offset,
        }
    }
}

/// what the poller last reported for a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    // None until the first poll finished
    pub connected: Option<bool>,
    pub snapshot: CoilSnapshot,
}

impl DeviceStatus {
    pub fn is_connected(&self) -> bool {
        self.connected == Some(true)
    }

    /// current and default setting including the offset, None while offline
    pub fn display_values(&self, calibration_offset: f64) -> Option<(f64, f64)> {
        if !self.is_connected() {
            return None;
        }
        let current = self.snapshot.current_raw_db()?;
        let default = self.snapshot.default_raw_db()?;
        Some((
            codec::to_display(current, calibration_offset),
            codec::to_display(default, calibration_offset),
        ))
    }
}

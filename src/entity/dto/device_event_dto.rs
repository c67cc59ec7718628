//! events published by the core for the presentation layer

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::device_command_dto::CommandOperation;
use crate::driver::modbus::prelude::DeviceId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEventDto {
    pub timestamp: DateTime<Local>,
    pub device_id: Option<DeviceId>,
    pub message: String,
}

impl LogEventDto {
    pub fn new(device_id: Option<DeviceId>, message: String) -> Self {
        LogEventDto {
            timestamp: Local::now(),
            device_id,
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceEventDto {
    ConnectivityChanged {
        device_id: DeviceId,
        connected: bool,
    },
    // only sent while connected, values include the calibration offset
    StateObserved {
        device_id: DeviceId,
        current_db: f64,
        default_db: f64,
        checkback_ok: bool,
    },
    CommandFailed {
        device_id: DeviceId,
        operation: CommandOperation,
        cause: String,
    },
    Log(LogEventDto),
}

impl DeviceEventDto {
    pub fn log(device_id: Option<DeviceId>, message: String) -> Self {
        DeviceEventDto::Log(LogEventDto::new(device_id, message))
    }

    pub fn device_id(&self) -> Option<DeviceId> {
        match self {
            DeviceEventDto::ConnectivityChanged { device_id, .. }
            | DeviceEventDto::StateObserved { device_id, .. }
            | DeviceEventDto::CommandFailed { device_id, .. } => Some(*device_id),
            DeviceEventDto::Log(log_event) => log_event.device_id,
        }
    }

    pub fn is_log(&self) -> bool {
        matches!(self, DeviceEventDto::Log(_))
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::common::error::DriverError;
use crate::driver::modbus::entity::{CURRENT_COIL_ADDR, DEFAULT_COIL_ADDR};
use crate::driver::modbus::prelude::*;

/// which attenuation bank a write goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOperation {
    SetCurrent,
    SetDefault,
}

impl CommandOperation {
    pub fn coil_addr(&self) -> ModbusAddrSize {
        match self {
            CommandOperation::SetCurrent => CURRENT_COIL_ADDR,
            CommandOperation::SetDefault => DEFAULT_COIL_ADDR,
        }
    }
}

impl fmt::Display for CommandOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOperation::SetCurrent => write!(f, "set current"),
            CommandOperation::SetDefault => write!(f, "set default"),
        }
    }
}

/// what happened to an accepted write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOutcome {
    Applied,
    // last poll saw the device offline, nothing was written
    SkippedDisconnected,
}

/// used for commanding the per-device writing worker
#[derive(Debug)]
pub struct DeviceCommandDto {
    pub device_id: DeviceId,
    pub operation: CommandOperation,
    // operator value, calibration offset included
    pub target_db: f64,
    pub reply_tx: oneshot::Sender<Result<CommandOutcome, DriverError>>,
}

//! modbus 有关的内部使用实体
use serde::{Deserialize, Serialize};

use super::codec;
use super::prelude::*;
use crate::common::error::DriverError;

// register map of the attenuator module
pub const CURRENT_COIL_ADDR: ModbusAddrSize = 0;
pub const DEFAULT_COIL_ADDR: ModbusAddrSize = 6;
pub const COIL_NUM: ModbusAddrSize = 12;
pub const CHECKBACK_INPUT_ADDR: ModbusAddrSize = 0;
pub const CHECKBACK_INPUT_NUM: ModbusAddrSize = 6;

/// last observed raw state of one attenuator
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CoilSnapshot {
    pub current_bits: CoilBits,
    pub default_bits: CoilBits,
    // discrete input readback equals current_bits
    pub checkback: bool,
    // false means every other field is empty
    pub connected: bool,
}

impl CoilSnapshot {
    pub fn disconnected() -> Self {
        CoilSnapshot::default()
    }

    /// build a snapshot from a 12-coil read and the 6 discrete input readback
    pub fn from_reads(coils: &[bool], readback: &[bool]) -> Result<Self, DriverError> {
        let current_bits = codec::bank(coils, CURRENT_COIL_ADDR as usize)?;
        let default_bits = codec::bank(coils, DEFAULT_COIL_ADDR as usize)?;
        let readback_bits = codec::bank(readback, CHECKBACK_INPUT_ADDR as usize)?;
        Ok(CoilSnapshot {
            current_bits,
            default_bits,
            checkback: current_bits == readback_bits,
            connected: true,
        })
    }

    pub fn current_raw_db(&self) -> Option<f64> {
        self.connected.then(|| codec::decode(&self.current_bits))
    }

    pub fn default_raw_db(&self) -> Option<f64> {
        self.connected.then(|| codec::decode(&self.default_bits))
    }
}

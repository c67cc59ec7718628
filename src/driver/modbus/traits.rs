use std::time::Duration;

use async_trait::async_trait;

use super::prelude::*;
use crate::common::error::DriverError;

/// something that can open a short lived modbus session to one device
/// every operation opens its own session and closes it right after use
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// `address` is the IPv4 literal stored in the registry
    /// - `InvalidAddress` before any connect attempt if it does not parse
    /// - `Unreachable` when connect fails or exceeds `timeout`
    async fn open(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<Box<dyn LinkSession>, DriverError>;
}

/// one open modbus session, not shared between tasks
#[async_trait]
pub trait LinkSession: Send {
    async fn read_coils(
        &mut self,
        start_addr: ModbusAddrSize,
        count: ModbusAddrSize,
    ) -> Result<Vec<bool>, DriverError>;

    async fn read_discrete_inputs(
        &mut self,
        start_addr: ModbusAddrSize,
        count: ModbusAddrSize,
    ) -> Result<Vec<bool>, DriverError>;

    async fn write_multiple_coils(
        &mut self,
        start_addr: ModbusAddrSize,
        values: &[bool],
    ) -> Result<(), DriverError>;

    /// close the session, errors here are not interesting to callers
    async fn close(&mut self) -> Result<(), DriverError>;
}

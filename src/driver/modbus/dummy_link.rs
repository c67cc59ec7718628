//! simulated attenuator used when `env.mode = "dummy"`
//! keeps 12 coils per address in memory, discrete inputs mirror coils 0..6

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::entity::{CHECKBACK_INPUT_NUM, COIL_NUM};
use super::modbus_link::parse_ipv4;
use super::prelude::*;
use super::traits::{DeviceLink, LinkSession};
use crate::common::error::DriverError;
use crate::info;

const LOG_TAG: &str = "dummy_link";

type CoilTable = Arc<Mutex<HashMap<String, Vec<bool>>>>;

#[derive(Clone, Default)]
pub struct DummyLink {
    coils: CoilTable,
}

impl DummyLink {
    pub fn new() -> Self {
        DummyLink::default()
    }

    /// coil state of one simulated device, None if it was never opened
    pub fn coils_of(&self, address: &str) -> Option<Vec<bool>> {
        self.coils.lock().ok()?.get(address).cloned()
    }
}

#[async_trait]
impl DeviceLink for DummyLink {
    async fn open(
        &self,
        address: &str,
        _timeout: Duration,
    ) -> Result<Box<dyn LinkSession>, DriverError> {
        parse_ipv4(address)?;
        let mut table = self
            .coils
            .lock()
            .map_err(|e| DriverError::Unreachable(format!("dummy coil table poisoned: {e}")))?;
        // a fresh module powers up at 0 dB, every coil set
        table
            .entry(address.to_string())
            .or_insert_with(|| vec![true; COIL_NUM as usize]);
        Ok(Box::new(DummySession {
            address: address.to_string(),
            coils: self.coils.clone(),
        }))
    }
}

struct DummySession {
    address: String,
    coils: CoilTable,
}

impl DummySession {
    fn read_range(
        &self,
        start: ModbusAddrSize,
        count: ModbusAddrSize,
        limit: ModbusAddrSize,
    ) -> Result<Vec<bool>, DriverError> {
        if u32::from(start) + u32::from(count) > u32::from(limit) {
            return Err(DriverError::ProtocolError(format!(
                "illegal data address, start: {}, count: {}",
                start, count
            )));
        }
        let table = self
            .coils
            .lock()
            .map_err(|e| DriverError::ProtocolError(format!("dummy coil table poisoned: {e}")))?;
        let coils = table
            .get(&self.address)
            .ok_or_else(|| DriverError::Unreachable(format!("{} not opened", self.address)))?;
        Ok(coils[start as usize..(start + count) as usize].to_vec())
    }
}

#[async_trait]
impl LinkSession for DummySession {
    async fn read_coils(
        &mut self,
        start_addr: ModbusAddrSize,
        count: ModbusAddrSize,
    ) -> Result<Vec<bool>, DriverError> {
        self.read_range(start_addr, count, COIL_NUM)
    }

    async fn read_discrete_inputs(
        &mut self,
        start_addr: ModbusAddrSize,
        count: ModbusAddrSize,
    ) -> Result<Vec<bool>, DriverError> {
        self.read_range(start_addr, count, CHECKBACK_INPUT_NUM)
    }

    async fn write_multiple_coils(
        &mut self,
        start_addr: ModbusAddrSize,
        values: &[bool],
    ) -> Result<(), DriverError> {
        let end = start_addr as usize + values.len();
        if end > COIL_NUM as usize {
            return Err(DriverError::ProtocolError(format!(
                "illegal data address, start: {}, count: {}",
                start_addr,
                values.len()
            )));
        }
        let mut table = self
            .coils
            .lock()
            .map_err(|e| DriverError::ProtocolError(format!("dummy coil table poisoned: {e}")))?;
        let coils = table
            .get_mut(&self.address)
            .ok_or_else(|| DriverError::Unreachable(format!("{} not opened", self.address)))?;
        coils[start_addr as usize..end].copy_from_slice(values);
        info!(LOG_TAG, "simulated write, address: {}, start: {}, values: {:?}", self.address, start_addr, values);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_back() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let link = DummyLink::new();
            let mut session = link.open("10.0.0.5", Duration::from_secs(1)).await.unwrap();
            assert_eq!(session.read_coils(0, 12).await.unwrap(), vec![true; 12]);

            session
                .write_multiple_coils(6, &[false, false, false, false, false, true])
                .await
                .unwrap();
            let coils = session.read_coils(0, 12).await.unwrap();
            assert_eq!(&coils[6..], &[false, false, false, false, false, true]);
            // readback mirrors the current bank only
            assert_eq!(session.read_discrete_inputs(0, 6).await.unwrap(), vec![true; 6]);
            session.close().await.unwrap();

            assert_eq!(link.coils_of("10.0.0.5").unwrap()[11], true);
        });
    }

    #[test]
    fn test_invalid_address_and_range() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let link = DummyLink::new();
            assert!(matches!(
                link.open("not-an-ip", Duration::from_secs(1)).await,
                Err(DriverError::InvalidAddress(_))
            ));
            let mut session = link.open("10.0.0.5", Duration::from_secs(1)).await.unwrap();
            assert!(matches!(
                session.read_discrete_inputs(0, 7).await,
                Err(DriverError::ProtocolError(_))
            ));
        });
    }
}

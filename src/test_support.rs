//! scripted link for unit tests
//! records every session window per address so tests can check that
//! sessions to the same device never overlap

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::common::error::DriverError;
use crate::driver::modbus::entity::COIL_NUM;
use crate::driver::modbus::modbus_link::parse_ipv4;
use crate::driver::modbus::prelude::*;
use crate::driver::modbus::traits::{DeviceLink, LinkSession};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub address: String,
    pub start_addr: ModbusAddrSize,
    pub values: Vec<bool>,
}

#[derive(Default)]
struct FakeState {
    coils: HashMap<String, Vec<bool>>,
    // overrides the discrete input mirror of coils 0..6
    readback: HashMap<String, Vec<bool>>,
    open_failures: VecDeque<DriverError>,
    read_failures: VecDeque<DriverError>,
    write_failures: VecDeque<DriverError>,
    in_flight: HashMap<String, usize>,
    overlap_seen: bool,
    opens: usize,
    writes: Vec<RecordedWrite>,
}

#[derive(Clone, Default)]
pub struct FakeLink {
    state: Arc<Mutex<FakeState>>,
    op_delay: Duration,
}

impl FakeLink {
    pub fn new() -> Self {
        FakeLink::default()
    }

    /// every read and write sleeps this long while the session is open
    pub fn with_op_delay(mut self, delay: Duration) -> Self {
        self.op_delay = delay;
        self
    }

    pub fn set_coils(&self, address: &str, coils: Vec<bool>) {
        self.state.lock().unwrap().coils.insert(address.to_string(), coils);
    }

    pub fn set_readback(&self, address: &str, readback: Vec<bool>) {
        self.state.lock().unwrap().readback.insert(address.to_string(), readback);
    }

    pub fn fail_next_opens(&self, n: usize) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..n {
            state
                .open_failures
                .push_back(DriverError::Unreachable("connection refused".to_string()));
        }
    }

    pub fn fail_next_read(&self, error: DriverError) {
        self.state.lock().unwrap().read_failures.push_back(error);
    }

    pub fn fail_next_write(&self, error: DriverError) {
        self.state.lock().unwrap().write_failures.push_back(error);
    }

    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn overlap_seen(&self) -> bool {
        self.state.lock().unwrap().overlap_seen
    }
}

#[async_trait]
impl DeviceLink for FakeLink {
    async fn open(
        &self,
        address: &str,
        _timeout: Duration,
    ) -> Result<Box<dyn LinkSession>, DriverError> {
        parse_ipv4(address)?;
        {
            let mut state = self.state.lock().unwrap();
            state.opens += 1;
            if let Some(e) = state.open_failures.pop_front() {
                return Err(e);
            }
            let in_flight = state.in_flight.entry(address.to_string()).or_insert(0);
            *in_flight += 1;
            if *in_flight > 1 {
                state.overlap_seen = true;
            }
        }
        Ok(Box::new(FakeSession {
            address: address.to_string(),
            state: self.state.clone(),
            op_delay: self.op_delay,
            closed: false,
        }))
    }
}

struct FakeSession {
    address: String,
    state: Arc<Mutex<FakeState>>,
    op_delay: Duration,
    closed: bool,
}

impl FakeSession {
    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.state.lock().unwrap();
        if let Some(in_flight) = state.in_flight.get_mut(&self.address) {
            *in_flight -= 1;
        }
    }

    async fn pause(&self) {
        if !self.op_delay.is_zero() {
            tokio::time::sleep(self.op_delay).await;
        }
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl LinkSession for FakeSession {
    async fn read_coils(
        &mut self,
        start_addr: ModbusAddrSize,
        count: ModbusAddrSize,
    ) -> Result<Vec<bool>, DriverError> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.read_failures.pop_front() {
            return Err(e);
        }
        let coils = state
            .coils
            .entry(self.address.clone())
            .or_insert_with(|| vec![true; COIL_NUM as usize]);
        Ok(coils[start_addr as usize..(start_addr + count) as usize].to_vec())
    }

    async fn read_discrete_inputs(
        &mut self,
        start_addr: ModbusAddrSize,
        count: ModbusAddrSize,
    ) -> Result<Vec<bool>, DriverError> {
        self.pause().await;
        let state = self.state.lock().unwrap();
        let mirror = match state.readback.get(&self.address) {
            Some(readback) => readback.clone(),
            None => state
                .coils
                .get(&self.address)
                .cloned()
                .unwrap_or_else(|| vec![true; COIL_NUM as usize]),
        };
        Ok(mirror[start_addr as usize..(start_addr + count) as usize].to_vec())
    }

    async fn write_multiple_coils(
        &mut self,
        start_addr: ModbusAddrSize,
        values: &[bool],
    ) -> Result<(), DriverError> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.write_failures.pop_front() {
            return Err(e);
        }
        state.writes.push(RecordedWrite {
            address: self.address.clone(),
            start_addr,
            values: values.to_vec(),
        });
        let coils = state
            .coils
            .entry(self.address.clone())
            .or_insert_with(|| vec![true; COIL_NUM as usize]);
        let start = start_addr as usize;
        coils[start..start + values.len()].copy_from_slice(values);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.release();
        Ok(())
    }
}

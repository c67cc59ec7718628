//! device control core for Modbus-TCP programmable RF attenuators
//! - polls every module for its coil state and checkback readback
//! - converts attenuation values to and from the 6-coil pattern
//! - serializes writes against the poller per device

pub mod common;
pub mod device_controller;
pub mod driver;
pub mod entity;

#[cfg(test)]
mod test_support;

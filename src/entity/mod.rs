//! data transmission objects shared by the driver and the device controller
pub mod dto;

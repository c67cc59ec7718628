//! modbus 驱动
//! - attenuation codec and register map of the attenuator module
//! - the link seam and its Modbus-TCP / simulated implementations

pub mod codec;
pub mod dummy_link;
pub mod entity;
pub mod modbus_link;
pub mod prelude;
pub mod traits;

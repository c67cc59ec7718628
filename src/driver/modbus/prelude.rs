//! modbus 相关的基础类型

/// modbus unit id (slave id)
pub type ModbusUnitSize = u8;

/// coil / discrete input address and quantity
pub type ModbusAddrSize = u16;

/// stable identity of an attenuator module within a run
pub type DeviceId = u8;

/// number of coils one attenuation setting occupies
pub const SETTING_BIT_NUM: usize = 6;

/// one attenuation setting as it sits on the wire, least significant bit first
pub type CoilBits = [bool; SETTING_BIT_NUM];

use std::io;

use thiserror::Error;

use crate::driver::modbus::prelude::DeviceId;
use crate::entity::dto::device_command_dto::CommandOperation;

/// 设备驱动错误
/// errors raised by the link, codec, registry and controller
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriverError {
    // address cannot be parsed, no connection was attempted
    #[error("invalid device address: {0}")]
    InvalidAddress(String),

    // connect failure or timeout
    #[error("device unreachable: {0}")]
    Unreachable(String),

    // malformed or unexpected modbus response
    #[error("modbus protocol error: {0}")]
    ProtocolError(String),

    // attenuation outside [0, 31.5] dB or not a 0.5 dB step
    #[error("invalid attenuation value: {0}")]
    InvalidValue(String),

    #[error("{operation} failed on device {device_id}: {cause}")]
    CommandFailed {
        device_id: DeviceId,
        operation: CommandOperation,
        cause: Box<DriverError>,
    },

    #[error("device not found, device_id: {0}")]
    DeviceNotFound(DeviceId),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("channel error: {0}")]
    ChannelError(String),
}

impl DriverError {
    /// sort a tokio-modbus io error into the link taxonomy
    pub fn from_io(context: &str, e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::TimedOut => DriverError::Unreachable(format!("{context}: {e}")),
            _ => DriverError::ProtocolError(format!("{context}: {e}")),
        }
    }

    /// connect failures of any kind mean the device cannot be reached
    pub fn from_connect_io(context: &str, e: io::Error) -> Self {
        DriverError::Unreachable(format!("{context}: {e}"))
    }

    /// true when the error means the device should be shown as disconnected
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            DriverError::InvalidAddress(_)
                | DriverError::Unreachable(_)
                | DriverError::ProtocolError(_)
        )
    }
}

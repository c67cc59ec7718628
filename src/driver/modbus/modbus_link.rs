//! Modbus-TCP implementation of the device link
//! 每次操作打开一个新的连接，用完立即关闭

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

use super::prelude::*;
use super::traits::{DeviceLink, LinkSession};
use crate::common::error::DriverError;
use crate::{debug, trace};

const LOG_TAG: &str = "modbus_link";

/// parse the IPv4 literal stored in the registry
pub fn parse_ipv4(address: &str) -> Result<Ipv4Addr, DriverError> {
    Ipv4Addr::from_str(address.trim())
        .map_err(|_| DriverError::InvalidAddress(format!("'{}' is not an IPv4 address", address)))
}

pub fn socket_addr(address: &str, port: u16) -> Result<SocketAddr, DriverError> {
    Ok(SocketAddr::V4(SocketAddrV4::new(parse_ipv4(address)?, port)))
}

/// run one modbus call under a deadline, an expired deadline counts as unreachable
async fn with_timeout<T, F>(context: &str, timeout: Duration, fut: F) -> Result<T, DriverError>
where
    F: Future<Output = std::io::Result<T>>,
{
    with_timeout_as(context, timeout, fut, DriverError::from_io).await
}

async fn with_timeout_as<T, F>(
    context: &str,
    timeout: Duration,
    fut: F,
    classify: fn(&str, std::io::Error) -> DriverError,
) -> Result<T, DriverError>
where
    F: Future<Output = std::io::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(classify(context, e)),
        Err(_) => Err(DriverError::Unreachable(format!(
            "{context}: no answer within {} ms",
            timeout.as_millis()
        ))),
    }
}

fn check_len(context: &str, values: Vec<bool>, count: ModbusAddrSize) -> Result<Vec<bool>, DriverError> {
    if values.len() < count as usize {
        return Err(DriverError::ProtocolError(format!(
            "{context}: expected {} values, got {}",
            count,
            values.len()
        )));
    }
    Ok(values)
}

/// link that talks Modbus-TCP to real hardware
pub struct ModbusTcpLink {
    port: u16,
    unit: ModbusUnitSize,
}

impl ModbusTcpLink {
    pub fn new(port: u16, unit: ModbusUnitSize) -> Self {
        ModbusTcpLink { port, unit }
    }
}

#[async_trait]
impl DeviceLink for ModbusTcpLink {
    async fn open(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<Box<dyn LinkSession>, DriverError> {
        let socket_addr = socket_addr(address, self.port)?;
        trace!(LOG_TAG, "connecting {}", socket_addr);
        let context = with_timeout_as(
            "connect",
            timeout,
            tcp::connect_slave(socket_addr, Slave(self.unit)),
            DriverError::from_connect_io,
        )
        .await?;
        Ok(Box::new(ModbusTcpSession {
            socket_addr,
            context,
            timeout,
        }))
    }
}

/// an open Modbus-TCP client context, every call shares the open timeout
pub struct ModbusTcpSession {
    socket_addr: SocketAddr,
    context: Context,
    timeout: Duration,
}

#[async_trait]
impl LinkSession for ModbusTcpSession {
    async fn read_coils(
        &mut self,
        start_addr: ModbusAddrSize,
        count: ModbusAddrSize,
    ) -> Result<Vec<bool>, DriverError> {
        let values = with_timeout(
            "read coils",
            self.timeout,
            self.context.read_coils(start_addr, count),
        )
        .await?;
        check_len("read coils", values, count)
    }

    async fn read_discrete_inputs(
        &mut self,
        start_addr: ModbusAddrSize,
        count: ModbusAddrSize,
    ) -> Result<Vec<bool>, DriverError> {
        let values = with_timeout(
            "read discrete inputs",
            self.timeout,
            self.context.read_discrete_inputs(start_addr, count),
        )
        .await?;
        check_len("read discrete inputs", values, count)
    }

    async fn write_multiple_coils(
        &mut self,
        start_addr: ModbusAddrSize,
        values: &[bool],
    ) -> Result<(), DriverError> {
        with_timeout(
            "write multiple coils",
            self.timeout,
            self.context.write_multiple_coils(start_addr, values),
        )
        .await
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        debug!(LOG_TAG, "closing session to {}", self.socket_addr);
        with_timeout("disconnect", self.timeout, self.context.disconnect()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4() {
        assert_eq!(parse_ipv4("192.168.10.84").unwrap(), Ipv4Addr::new(192, 168, 10, 84));
        assert!(matches!(parse_ipv4("999.1.1.1"), Err(DriverError::InvalidAddress(_))));
        assert!(matches!(parse_ipv4("192.168.10"), Err(DriverError::InvalidAddress(_))));
        assert!(matches!(parse_ipv4("device-1.local"), Err(DriverError::InvalidAddress(_))));
    }

    #[test]
    fn test_socket_addr_uses_port() {
        let addr = socket_addr("10.0.0.1", 5020).unwrap();
        assert_eq!(addr.port(), 5020);
    }

    #[tokio::test]
    async fn test_connect_error_is_unreachable() {
        let refused = async {
            Err::<(), _>(std::io::Error::new(std::io::ErrorKind::NetworkUnreachable, "network unreachable"))
        };
        let result = with_timeout_as("connect", Duration::from_millis(100), refused, DriverError::from_connect_io).await;
        assert!(matches!(result, Err(DriverError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_open_invalid_address_does_not_connect() {
        let link = ModbusTcpLink::new(502, 1);
        let result = link.open("300.0.0.1", Duration::from_millis(100)).await;
        assert!(matches!(result, Err(DriverError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_open_closed_port_is_unreachable() {
        // bind then drop to get a local port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let link = ModbusTcpLink::new(port, 1);
        let result = link.open("127.0.0.1", Duration::from_millis(500)).await;
        assert!(matches!(result, Err(DriverError::Unreachable(_))));
    }
}

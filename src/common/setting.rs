//! setting config file
//! `config_{ENV}.toml` in the working directory, every section is optional

use std::env;
use std::fs;
use std::time::Duration;

use lazy_static::lazy_static;
use serde::Deserialize;

use super::error::DriverError;
use crate::driver::modbus::prelude::DeviceId;

pub const DEFAULT_CALIBRATION_OFFSET: f64 = 4.5;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Env {
    pub debug: bool,
    pub env: String,
    pub log_level: String,
    // "real" talks to hardware, "dummy" uses the simulated attenuator
    pub mode: String,
}

impl Default for Env {
    fn default() -> Self {
        Env {
            debug: false,
            env: String::from("dev"),
            log_level: String::from("info"),
            mode: String::from("real"),
        }
    }
}

impl Env {
    pub fn is_dummy(&self) -> bool {
        self.mode == "dummy"
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Modbus {
    pub port: u16,
    pub unit: u8,
    pub poll_interval_millis: u64,
    pub read_timeout_millis: u64,
    pub write_timeout_millis: u64,
}

impl Default for Modbus {
    fn default() -> Self {
        Modbus {
            port: 502,
            unit: 1,
            poll_interval_millis: 2000,
            read_timeout_millis: 2000,
            write_timeout_millis: 1000,
        }
    }
}

impl Modbus {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_millis)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Heartbeat {
    pub interval_millis: u64,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Heartbeat {
            interval_millis: 600_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSetting {
    pub id: DeviceId,
    pub address: String,
    #[serde(default = "default_calibration_offset")]
    pub calibration_offset: f64,
}

fn default_calibration_offset() -> f64 {
    DEFAULT_CALIBRATION_OFFSET
}

fn default_devices() -> Vec<DeviceSetting> {
    vec![
        DeviceSetting {
            id: 1,
            address: String::from("192.168.10.84"),
            calibration_offset: DEFAULT_CALIBRATION_OFFSET,
        },
        DeviceSetting {
            id: 2,
            address: String::from("192.168.10.85"),
            calibration_offset: DEFAULT_CALIBRATION_OFFSET,
        },
    ]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub env: Env,
    pub modbus: Modbus,
    pub heartbeat: Heartbeat,
    pub devices: Vec<DeviceSetting>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            env: Env::default(),
            modbus: Modbus::default(),
            heartbeat: Heartbeat::default(),
            devices: default_devices(),
        }
    }
}

impl Settings {
    /// parse settings from toml text
    pub fn from_toml_str(content: &str) -> Result<Self, DriverError> {
        let settings: Settings = toml::from_str(content)
            .map_err(|e| DriverError::ConfigError(format!("config file format invalid: {e}")))?;
        settings.check()?;
        Ok(settings)
    }

    /// read `config_{ENV}.toml`
    pub fn load() -> Result<Self, DriverError> {
        let env = match env::var("ENV") {
            Ok(e) => e,
            Err(_) => {
                log::warn!("no ENV set, use default: 'dev'");
                String::from("dev")
            }
        };
        let file_path = format!("config_{}.toml", env);
        let content = fs::read_to_string(file_path.as_str()).map_err(|e| {
            DriverError::ConfigError(format!("cannot read config file {}: {}", file_path, e))
        })?;
        Settings::from_toml_str(content.as_str())
    }

    pub fn get<'a>() -> &'a Self {
        // 给静态变量延迟赋值的宏
        lazy_static! {
            static ref CACHE: Settings = Settings::load().unwrap_or_else(|e| {
                log::warn!("{}, built-in defaults are used", e);
                Settings::default()
            });
        }
        &CACHE
    }

    fn check(&self) -> Result<(), DriverError> {
        let mut seen: Vec<DeviceId> = Vec::new();
        for device in &self.devices {
            if seen.contains(&device.id) {
                return Err(DriverError::ConfigError(format!(
                    "duplicated device id: {}",
                    device.id
                )));
            }
            if !device.calibration_offset.is_finite() {
                return Err(DriverError::ConfigError(format!(
                    "calibration offset of device {} is not a number",
                    device.id
                )));
            }
            seen.push(device.id);
        }
        if self.modbus.poll_interval_millis == 0 {
            return Err(DriverError::ConfigError(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_empty_file() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings.devices.len(), 2);
        assert_eq!(settings.devices[0].address, "192.168.10.84");
        assert_eq!(settings.devices[1].calibration_offset, 4.5);
        assert_eq!(settings.modbus.port, 502);
        assert_eq!(settings.modbus.poll_interval(), Duration::from_secs(2));
        assert_eq!(settings.modbus.write_timeout(), Duration::from_secs(1));
        assert!(!settings.env.is_dummy());
    }

    #[test]
    fn test_parse_devices() {
        let content = r#"
            [env]
            log_level = "debug"
            mode = "dummy"

            [modbus]
            poll_interval_millis = 500

            [[devices]]
            id = 1
            address = "10.0.0.7"
            calibration_offset = 3.0

            [[devices]]
            id = 2
            address = "10.0.0.8"
        "#;
        let settings = Settings::from_toml_str(content).unwrap();
        assert!(settings.env.is_dummy());
        assert_eq!(settings.env.log_level, "debug");
        assert_eq!(settings.modbus.poll_interval_millis, 500);
        assert_eq!(settings.modbus.read_timeout_millis, 2000);
        assert_eq!(settings.devices[0].calibration_offset, 3.0);
        assert_eq!(settings.devices[1].calibration_offset, DEFAULT_CALIBRATION_OFFSET);
    }

    #[test]
    fn test_duplicated_device_id() {
        let content = r#"
            [[devices]]
            id = 1
            address = "10.0.0.7"

            [[devices]]
            id = 1
            address = "10.0.0.8"
        "#;
        assert!(matches!(
            Settings::from_toml_str(content),
            Err(DriverError::ConfigError(_))
        ));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(Settings::from_toml_str("[[devices]]\nid = \"one\"").is_err());
    }
}

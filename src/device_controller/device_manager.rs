//! 设备管理器
//! builds the registry from settings and starts every background task:
//! one poller and one writer per device plus the heartbeat

use std::sync::{mpsc, Arc};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::attenuation_controller::AttenuationController;
use super::device_registry::DeviceRegistry;
use super::entity::device_po::DevicePo;
use super::workers::heartbeating_thread::heartbeating_thread;
use super::workers::polling_thread::{DevicePoller, PollerConfig};
use crate::common::error::DriverError;
use crate::common::setting::Settings;
use crate::driver::modbus::dummy_link::DummyLink;
use crate::driver::modbus::modbus_link::ModbusTcpLink;
use crate::driver::modbus::traits::DeviceLink;
use crate::entity::dto::device_event_dto::DeviceEventDto;
use crate::{info, warn};

const LOG_TAG: &str = "device_manager";

/// pick the link implementation for `env.mode`
pub fn link_from_settings(settings: &Settings) -> Arc<dyn DeviceLink> {
    if settings.env.is_dummy() {
        info!(LOG_TAG, "dummy mode, no modbus connection will be opened");
        Arc::new(DummyLink::new())
    } else {
        Arc::new(ModbusTcpLink::new(settings.modbus.port, settings.modbus.unit))
    }
}

pub struct DeviceManager {
    registry: Arc<DeviceRegistry>,
    controller: AttenuationController,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl DeviceManager {
    /// must be called inside a tokio runtime
    /// returns the manager and the receiving end of the event channel
    pub fn start(
        settings: &Settings,
        link: Arc<dyn DeviceLink>,
    ) -> Result<(Self, mpsc::Receiver<DeviceEventDto>), DriverError> {
        let (event_tx, event_rx) = mpsc::channel();
        let devices: Vec<DevicePo> = settings.devices.iter().map(DevicePo::from).collect();
        let registry = Arc::new(DeviceRegistry::new(devices, Some(event_tx.clone()))?);
        let shutdown = CancellationToken::new();

        let (controller, mut handles) = AttenuationController::start(
            registry.clone(),
            link.clone(),
            event_tx.clone(),
            settings.modbus.write_timeout(),
            shutdown.clone(),
        );

        let poller_config = PollerConfig::from(&settings.modbus);
        for device_id in registry.device_ids() {
            let poller = DevicePoller::new(
                device_id,
                registry.clone(),
                link.clone(),
                event_tx.clone(),
                poller_config,
            );
            handles.push(poller.start(shutdown.clone()));
        }

        handles.push(heartbeating_thread(
            Duration::from_millis(settings.heartbeat.interval_millis),
            registry.clone(),
            event_tx,
            shutdown.clone(),
        ));

        info!(LOG_TAG, "device manager started, devices: {:?}", registry.device_ids());
        Ok((
            DeviceManager {
                registry,
                controller,
                shutdown,
                handles,
            },
            event_rx,
        ))
    }

    pub fn registry(&self) -> Arc<DeviceRegistry> {
        self.registry.clone()
    }

    pub fn controller(&self) -> AttenuationController {
        self.controller.clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// stop scheduling new work and wait for in-flight operations to finish
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                warn!(LOG_TAG, "background task ended abnormally: {}", e);
            }
        }
        info!(LOG_TAG, "device manager stopped");
    }
}

use std::error::Error;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use dotenv::dotenv;
use rf_attenuator_engine::common::logger::init_logger;
use rf_attenuator_engine::common::setting::Settings;
use rf_attenuator_engine::device_controller::device_manager::{link_from_settings, DeviceManager};
use rf_attenuator_engine::entity::dto::device_event_dto::DeviceEventDto;
use rf_attenuator_engine::{debug, error, info, warn};

const LOG_TAG: &str = "main";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // 检查 env 文件
    dotenv().ok();

    // 加载 config
    let settings = Settings::get();

    // 设置 logger
    init_logger()?;
    info!(LOG_TAG, "config loaded, env: {:?}, mode: {}", settings.env.env, settings.env.mode);
    debug!(LOG_TAG, "config: {:?}", settings);

    let link = link_from_settings(settings);
    let (manager, event_rx) = DeviceManager::start(settings, link)?;
    let reporter = event_reporting_thread(event_rx);

    let shutdown = manager.shutdown_token();
    ctrlc::set_handler(move || shutdown.cancel())?;

    manager.shutdown_token().cancelled().await;
    info!(LOG_TAG, "shutdown requested");
    manager.shutdown().await;

    if reporter.join().is_err() {
        error!(LOG_TAG, "event reporting thread panicked");
    }
    Ok(())
}

/// drain core events into the log until every sender is gone
fn event_reporting_thread(event_rx: mpsc::Receiver<DeviceEventDto>) -> JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(event) = event_rx.recv() {
            match &event {
                DeviceEventDto::ConnectivityChanged { device_id, connected } => {
                    info!(LOG_TAG, "device {} connected: {}", device_id, connected);
                }
                DeviceEventDto::StateObserved { .. } => match serde_json::to_string(&event) {
                    Ok(json) => debug!(LOG_TAG, "{}", json),
                    Err(e) => warn!(LOG_TAG, "cannot serialize event: {}", e),
                },
                DeviceEventDto::CommandFailed { device_id, operation, cause } => {
                    error!(LOG_TAG, "device {} {} failed: {}", device_id, operation, cause);
                }
                DeviceEventDto::Log(log_event) => {
                    let device = log_event
                        .device_id
                        .map(|id| format!("[{}] ", id))
                        .unwrap_or_default();
                    info!(
                        LOG_TAG,
                        "[{}] - {}{}",
                        log_event.timestamp.format("%d.%m.%Y %H:%M:%S%.3f"),
                        device,
                        log_event.message
                    );
                }
            }
        }
        info!(LOG_TAG, "event channel closed");
    })
}

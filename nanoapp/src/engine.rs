// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::io;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use log::{debug, info};
use tokio::runtime::Builder;
use tokio::select;
use tokio::sync::mpsc;

use crate::app_manager::{AppManager, Event};
use crate::ble_scan_provider::BleScanCallback;
use crate::client_provider::ClientProvider;
use crate::consts::BLE_SCAN_KEEP_ALIVE_INTERVAL_NS;
use crate::nearby_extension::NearbyExtension;
use crate::platform::{
    BleCapabilities, BleDriver, BleFilterCapabilities, BleScanFilter, Clock, EndpointId, HostEndpointInfo,
    HostLink, ScanMode, TimerService,
};
use crate::proto::FilterMessageType;
use crate::provider::ProviderEvent;
use crate::timer::TimerId;
use crate::timer_provider::TimerProvider;

const PROVIDER_EVENT_CHANNEL_BUF_SIZE: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub event_channel_capacity: usize,
    pub keep_alive_interval_ns: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            event_channel_capacity: PROVIDER_EVENT_CHANNEL_BUF_SIZE,
            keep_alive_interval_ns: BLE_SCAN_KEEP_ALIVE_INTERVAL_NS,
        }
    }
}

/// The engine plus the handles the driver and the host use to feed it.
pub struct NearbyEngine {
    pub engine: Engine,
    pub client_provider: ClientProvider,
    pub ble_scan_callback: BleScanCallback,
}

impl NearbyEngine {
    pub fn new(
        config: EngineConfig,
        ble_driver: Box<dyn BleDriver + Send>,
        host_link: Box<dyn HostLink + Send>,
        extension: Box<dyn NearbyExtension + Send>,
    ) -> Self {
        info!("Create Nearby engine.");
        let (provider_tx, provider_rx) = mpsc::channel::<ProviderEvent>(config.event_channel_capacity.max(1));
        Self {
            engine: Engine { provider_rx, config, ble_driver, host_link, extension },
            client_provider: ClientProvider::new(provider_tx.clone()),
            ble_scan_callback: BleScanCallback::new(provider_tx),
        }
    }
}

pub struct Engine {
    // Receive events from Providers.
    provider_rx: mpsc::Receiver<ProviderEvent>,
    config: EngineConfig,
    ble_driver: Box<dyn BleDriver + Send>,
    host_link: Box<dyn HostLink + Send>,
    extension: Box<dyn NearbyExtension + Send>,
}

impl Engine {
    /// Runs the event loop on the calling thread until a stop event arrives
    /// or every provider handle is dropped.
    pub fn run(self) -> io::Result<()> {
        info!("Run Nearby engine.");
        let runtime = Builder::new_current_thread().enable_time().build()?;
        let Engine { mut provider_rx, config, ble_driver, host_link, extension } = self;
        runtime.block_on(async move {
            let platform = EnginePlatform {
                start: Instant::now(),
                timers: TimerProvider::new(),
                ble_driver,
                host_link,
            };
            let mut app_manager =
                AppManager::with_keep_alive_interval_ns(platform, extension, config.keep_alive_interval_ns);
            if !app_manager.is_initialized() {
                info!("BLE scan is not available on this platform");
            }
            poll_providers(&mut provider_rx, &mut app_manager).await;
            app_manager.shutdown();
        });
        Ok(())
    }
}

async fn poll_providers(provider_rx: &mut mpsc::Receiver<ProviderEvent>, app_manager: &mut AppManager<EnginePlatform>) {
    loop {
        let event = select! {
            event = provider_rx.recv() => match event {
                Some(ProviderEvent::Platform(event)) => event,
                Some(ProviderEvent::Stop) => {
                    info!("Engine stopped");
                    break;
                }
                None => {
                    info!("All providers dropped, engine stopped");
                    break;
                }
            },
            id = app_manager.platform_mut().timers.next_fired() => Event::Timer(id),
        };
        app_manager.handle_event(event);
    }
}

/// Platform services backed by tokio timers, the process clock and the
/// boxed driver and host link.
struct EnginePlatform {
    start: Instant,
    timers: TimerProvider,
    ble_driver: Box<dyn BleDriver + Send>,
    host_link: Box<dyn HostLink + Send>,
}

impl Clock for EnginePlatform {
    fn now_ns(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn estimated_host_time_offset_ns(&self) -> i64 {
        let host_now_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        host_now_ns.saturating_sub(i64::try_from(self.now_ns()).unwrap_or(i64::MAX))
    }
}

impl TimerService for EnginePlatform {
    fn set_timer(&mut self, delay_ns: u64, one_shot: bool) -> Option<TimerId> {
        self.timers.set_timer(delay_ns, one_shot)
    }

    fn cancel_timer(&mut self, id: TimerId) -> bool {
        self.timers.cancel_timer(id)
    }
}

impl BleDriver for EnginePlatform {
    fn capabilities(&self) -> BleCapabilities {
        self.ble_driver.capabilities()
    }

    fn filter_capabilities(&self) -> BleFilterCapabilities {
        self.ble_driver.filter_capabilities()
    }

    fn start_scan(&mut self, mode: ScanMode, report_delay_ms: u32, filter: &BleScanFilter) -> bool {
        debug!("Start scan in {:?} mode", mode);
        self.ble_driver.start_scan(mode, report_delay_ms, filter)
    }

    fn stop_scan(&mut self) -> bool {
        self.ble_driver.stop_scan()
    }

    fn flush(&mut self) -> bool {
        self.ble_driver.flush()
    }
}

impl HostLink for EnginePlatform {
    fn send_message(&mut self, endpoint: EndpointId, message_type: FilterMessageType, payload: Vec<u8>) -> bool {
        self.host_link.send_message(endpoint, message_type, payload)
    }

    fn host_endpoint_info(&self, endpoint: EndpointId) -> Option<HostEndpointInfo> {
        self.host_link.host_endpoint_info(endpoint)
    }
}

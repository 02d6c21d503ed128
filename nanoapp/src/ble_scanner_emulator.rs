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

//! Mock BLE controller that replays a fixed set of advertisements whenever
//! a scan starts.

use std::sync::mpsc;
use std::thread::{self, sleep, JoinHandle};
use std::time::Duration;

use bluetooth::BleAdvertisingReport;
use log::{debug, info};

use crate::ble_scan_provider::BleScanCallback;
use crate::platform::{
    AsyncResult, BleCapabilities, BleDriver, BleFilterCapabilities, BleRequestType, BleScanFilter, ScanMode,
};

const ADVERTISEMENT_INTERVAL: Duration = Duration::from_millis(200);

/// Requests forwarded from the driver to the emulator thread.
#[derive(Clone, Debug, PartialEq)]
pub enum ScanCommand {
    Start { report_delay_ms: u32, filter: BleScanFilter },
    Stop,
    Flush,
}

pub struct EmulatedBleDriver {
    capabilities: BleCapabilities,
    command_tx: mpsc::Sender<ScanCommand>,
}

impl EmulatedBleDriver {
    pub fn new(command_tx: mpsc::Sender<ScanCommand>) -> Self {
        Self { capabilities: BleCapabilities { scan: true, scan_result_batching: true }, command_tx }
    }

    pub fn with_capabilities(mut self, capabilities: BleCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    fn send(&self, command: ScanCommand) -> bool {
        self.command_tx.send(command).is_ok()
    }
}

impl BleDriver for EmulatedBleDriver {
    fn capabilities(&self) -> BleCapabilities {
        self.capabilities
    }

    fn filter_capabilities(&self) -> BleFilterCapabilities {
        BleFilterCapabilities { service_data: true }
    }

    fn start_scan(&mut self, _mode: ScanMode, report_delay_ms: u32, filter: &BleScanFilter) -> bool {
        self.send(ScanCommand::Start { report_delay_ms, filter: filter.clone() })
    }

    fn stop_scan(&mut self) -> bool {
        self.send(ScanCommand::Stop)
    }

    fn flush(&mut self) -> bool {
        self.send(ScanCommand::Flush)
    }
}

/// Starts the emulator thread. It runs until the driver is dropped.
pub fn spawn(
    command_rx: mpsc::Receiver<ScanCommand>,
    callback: BleScanCallback,
    advertisements: Vec<BleAdvertisingReport>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        info!("Mock BLE scanner starts");
        while let Ok(command) = command_rx.recv() {
            match command {
                ScanCommand::Start { report_delay_ms, filter } => {
                    callback.on_async_result(AsyncResult::success(BleRequestType::StartScan));
                    replay(&callback, &advertisements, &filter);
                    if report_delay_ms > 0 {
                        callback.on_batch_complete();
                    }
                }
                ScanCommand::Stop => debug!("Mock BLE scanner stopped"),
                ScanCommand::Flush => {
                    callback.on_flush_complete(AsyncResult::success(BleRequestType::Flush));
                }
            }
        }
        info!("Mock BLE scanner exits");
    })
}

fn replay(callback: &BleScanCallback, advertisements: &[BleAdvertisingReport], filter: &BleScanFilter) {
    for (i, report) in advertisements.iter().enumerate() {
        let passes_filters =
            filter.filters.is_empty() || filter.filters.iter().any(|hardware| hardware.matches(&report.data));
        let loud_enough = match (filter.rssi_threshold, report.rssi) {
            (Some(threshold), Some(rssi)) => rssi >= threshold,
            (Some(_), None) => false,
            (None, _) => true,
        };
        if !passes_filters || !loud_enough {
            continue;
        }
        sleep(ADVERTISEMENT_INTERVAL);
        info!("BLE scanner received advertisement: {}.", i);
        callback.on_advertisements(vec![report.clone()]);
    }
}

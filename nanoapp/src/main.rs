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

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use bluetooth::{BleAddress, BleAddressKind, BleAdvertisingReport};
use log::{error, info};

use nearby::ble_scanner_emulator::{self, EmulatedBleDriver};
use nearby::client_emulator::{self, HostEmulator};
use nearby::consts::FILTER_RESULTS_BUF_SIZE;
use nearby::platform::HostEndpointInfo;
use nearby::proto::{self, BleConfig, BleFilter, BleFilters};
use nearby::{EngineConfig, FilterMessageType, NearbyEngine, UnsupportedExtension};

const HOST_ENDPOINT: u16 = 0x0101;
const HOST_PACKAGE: &str = "com.google.android.gms";
const PRESENCE_INTENT: u32 = 5;
const RESULT_TIMEOUT: Duration = Duration::from_secs(5);

fn demo_advertisements() -> Vec<BleAdvertisingReport> {
    vec![
        // Presence v0 frame advertising intents 1 and 5.
        BleAdvertisingReport::new(
            BleAddress::new(0x0000_1122_3344_5566, BleAddressKind::Random),
            vec![0x02, 0x01, 0x06, 0x07, 0x16, 0xF1, 0xFC, 0x02, 0x26, 0x01, 0x05],
        )
        .with_rssi(-52)
        .with_tx_power(-20),
        // Flags only, dropped by the hardware filters.
        BleAdvertisingReport::new(BleAddress::new(0x0000_AABB_CCDD_EEFF, BleAddressKind::Public), vec![0x02, 0x01, 0x06])
            .with_rssi(-70),
    ]
}

fn send<T: serde::Serialize>(
    client_provider: &nearby::client_provider::ClientProvider,
    message_type: FilterMessageType,
    message: &T,
) {
    match proto::encode(message, FILTER_RESULTS_BUF_SIZE) {
        Ok(payload) => {
            client_provider.on_message(HOST_ENDPOINT, message_type as u32, payload);
        }
        Err(e) => error!("Failed to encode {:?}: {}", message_type, e),
    }
}

fn main() {
    env_logger::init();

    let (scan_command_tx, scan_command_rx) = mpsc::channel();
    let (host_message_tx, host_message_rx) = mpsc::channel();
    let host = HostEmulator::new(
        vec![HostEndpointInfo { endpoint_id: HOST_ENDPOINT, package_name: Some(HOST_PACKAGE.to_string()) }],
        host_message_tx,
    );
    let NearbyEngine { engine, client_provider, ble_scan_callback } = NearbyEngine::new(
        EngineConfig::default(),
        Box::new(EmulatedBleDriver::new(scan_command_tx)),
        Box::new(host),
        Box::new(UnsupportedExtension),
    );
    let scanner = ble_scanner_emulator::spawn(scan_command_rx, ble_scan_callback, demo_advertisements());
    let engine_thread = thread::spawn(move || engine.run());

    send(&client_provider, FilterMessageType::Config, &BleConfig { screen_on: Some(true), ..Default::default() });
    let filters = BleFilters {
        filters: vec![BleFilter { id: 1, intent: Some(PRESENCE_INTENT), latency_ms: Some(500), ..Default::default() }],
    };
    send(&client_provider, FilterMessageType::Filters, &filters);

    while let Ok(message) = host_message_rx.recv_timeout(RESULT_TIMEOUT) {
        info!("{}", client_emulator::describe(&message));
        if message.message_type == FilterMessageType::FilterResults {
            break;
        }
    }

    client_provider.stop();
    match engine_thread.join() {
        Ok(Ok(())) => info!("Engine finished"),
        Ok(Err(e)) => error!("Engine failed to start: {}", e),
        Err(_) => error!("Engine thread panicked"),
    }
    if scanner.join().is_err() {
        error!("BLE scanner emulator panicked");
    }
}

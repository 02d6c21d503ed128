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
use nearby::client_emulator::{HostEmulator, HostMessage};
use nearby::platform::{
    AsyncResult, BleCapabilities, BleDriver, BleFilterCapabilities, BleRequestType, BleScanFilter,
    HostEndpointInfo, ScanMode,
};
use nearby::proto::{self, BleFilter, BleFilterResults, BleFilters, ResultType};
use nearby::{EngineConfig, FilterMessageType, NearbyEngine, UnsupportedExtension};

const HOST_ENDPOINT: u16 = 4;
const EXPECTED_INTENT: u32 = 5;
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct ScanRequest {
    report_delay_ms: u32,
    filter: BleScanFilter,
}

struct MockBleDriver {
    scan_request_tx: mpsc::Sender<ScanRequest>,
}

impl BleDriver for MockBleDriver {
    fn capabilities(&self) -> BleCapabilities {
        BleCapabilities { scan: true, scan_result_batching: true }
    }

    fn filter_capabilities(&self) -> BleFilterCapabilities {
        BleFilterCapabilities { service_data: true }
    }

    fn start_scan(&mut self, _mode: ScanMode, report_delay_ms: u32, filter: &BleScanFilter) -> bool {
        println!("BleDriver start ble scan.");
        self.scan_request_tx.send(ScanRequest { report_delay_ms, filter: filter.clone() }).is_ok()
    }

    fn stop_scan(&mut self) -> bool {
        true
    }

    fn flush(&mut self) -> bool {
        true
    }
}

fn next_of_type(rx: &mpsc::Receiver<HostMessage>, message_type: FilterMessageType) -> HostMessage {
    loop {
        let message = rx.recv_timeout(RECV_TIMEOUT).unwrap();
        if message.message_type == message_type {
            return message;
        }
    }
}

#[test]
fn test_engine() {
    let (scan_request_tx, scan_request_rx) = mpsc::channel();
    let (host_message_tx, host_message_rx) = mpsc::channel();
    let host = HostEmulator::new(
        vec![HostEndpointInfo { endpoint_id: HOST_ENDPOINT, package_name: Some("com.example".to_string()) }],
        host_message_tx,
    );
    let NearbyEngine { engine, client_provider, ble_scan_callback } = NearbyEngine::new(
        EngineConfig::default(),
        Box::new(MockBleDriver { scan_request_tx }),
        Box::new(host),
        Box::new(UnsupportedExtension),
    );
    let engine_thread = thread::spawn(move || engine.run());

    let filters = BleFilters {
        filters: vec![BleFilter { id: 1, intent: Some(EXPECTED_INTENT), latency_ms: Some(400), ..Default::default() }],
    };
    assert!(client_provider.on_message(
        HOST_ENDPOINT,
        FilterMessageType::Filters as u32,
        proto::encode(&filters, 400).unwrap(),
    ));

    let ack = next_of_type(&host_message_rx, FilterMessageType::Success);
    assert_eq!(ack.endpoint, HOST_ENDPOINT);
    let request = scan_request_rx.recv_timeout(RECV_TIMEOUT).unwrap();
    println!("received request {:?}", request);
    assert_eq!(request.report_delay_ms, 400);
    assert_eq!(request.filter.filters.len(), 2);

    ble_scan_callback.on_async_result(AsyncResult::success(BleRequestType::StartScan));
    let report = BleAdvertisingReport::new(
        BleAddress::new(0x0102_0304_0506, BleAddressKind::Public),
        vec![0x07, 0x16, 0xF1, 0xFC, 0x02, 0x26, 0x01, 0x05],
    )
    .with_rssi(-45);
    assert!(ble_scan_callback.on_advertisements(vec![report]));
    assert!(ble_scan_callback.on_batch_complete());

    let message = next_of_type(&host_message_rx, FilterMessageType::FilterResults);
    let results: BleFilterResults = proto::decode(&message.payload).unwrap();
    println!("received filter results {:?}", results);
    assert_eq!(results.results.len(), 1);
    assert_eq!(results.results[0].intent, Some(EXPECTED_INTENT));
    assert_eq!(results.results[0].result_type, ResultType::Presence);
    assert_eq!(results.results[0].rssi, Some(-45));

    assert!(client_provider.stop());
    engine_thread.join().expect("Engine integration test crashed.").unwrap();
}

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

#![allow(dead_code)]

use nearby::platform::{
    BleCapabilities, BleDriver, BleFilterCapabilities, BleScanFilter, Clock, EndpointId, HostEndpointInfo,
    HostLink, ScanMode, TimerService,
};
use nearby::timer::TimerId;
use nearby::FilterMessageType;

pub const ONE_MS: u64 = 1_000_000;

#[derive(Clone, Debug, PartialEq)]
pub struct SentMessage {
    pub endpoint: EndpointId,
    pub message_type: FilterMessageType,
    pub payload: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArmedTimer {
    pub id: TimerId,
    pub delay_ns: u64,
    pub one_shot: bool,
}

/// Manual clock plus recorded timer, driver and host calls.
#[derive(Debug, Default)]
pub struct MockPlatform {
    pub now_ns: u64,
    pub capabilities: BleCapabilities,
    pub fail_timers: bool,
    next_timer: u32,
    pub timers: Vec<ArmedTimer>,
    pub scans: Vec<(u32, BleScanFilter)>,
    pub stops: usize,
    pub flushes: usize,
    pub sent: Vec<SentMessage>,
    pub endpoints: Vec<HostEndpointInfo>,
}

impl MockPlatform {
    pub fn new() -> Self {
        MockPlatform {
            capabilities: BleCapabilities { scan: true, scan_result_batching: true },
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint_id: EndpointId, package_name: &str) -> Self {
        self.endpoints.push(HostEndpointInfo { endpoint_id, package_name: Some(package_name.to_string()) });
        self
    }

    pub fn sent_of_type(&self, message_type: FilterMessageType) -> Vec<&SentMessage> {
        self.sent.iter().filter(|sent| sent.message_type == message_type).collect()
    }

    pub fn periodic_timer(&self, delay_ns: u64) -> Option<TimerId> {
        self.timers.iter().find(|timer| !timer.one_shot && timer.delay_ns == delay_ns).map(|timer| timer.id)
    }
}

impl Clock for MockPlatform {
    fn now_ns(&self) -> u64 {
        self.now_ns
    }

    fn estimated_host_time_offset_ns(&self) -> i64 {
        0
    }
}

impl TimerService for MockPlatform {
    fn set_timer(&mut self, delay_ns: u64, one_shot: bool) -> Option<TimerId> {
        if self.fail_timers {
            return None;
        }
        self.next_timer += 1;
        let id = TimerId(self.next_timer);
        self.timers.push(ArmedTimer { id, delay_ns, one_shot });
        Some(id)
    }

    fn cancel_timer(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|timer| timer.id != id);
        before != self.timers.len()
    }
}

impl BleDriver for MockPlatform {
    fn capabilities(&self) -> BleCapabilities {
        self.capabilities
    }

    fn filter_capabilities(&self) -> BleFilterCapabilities {
        BleFilterCapabilities { service_data: true }
    }

    fn start_scan(&mut self, _mode: ScanMode, report_delay_ms: u32, filter: &BleScanFilter) -> bool {
        self.scans.push((report_delay_ms, filter.clone()));
        true
    }

    fn stop_scan(&mut self) -> bool {
        self.stops += 1;
        true
    }

    fn flush(&mut self) -> bool {
        self.flushes += 1;
        true
    }
}

impl HostLink for MockPlatform {
    fn send_message(&mut self, endpoint: EndpointId, message_type: FilterMessageType, payload: Vec<u8>) -> bool {
        self.sent.push(SentMessage { endpoint, message_type, payload });
        true
    }

    fn host_endpoint_info(&self, endpoint: EndpointId) -> Option<HostEndpointInfo> {
        self.endpoints.iter().find(|info| info.endpoint_id == endpoint).cloned()
    }
}

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

//! Services the nanoapp consumes from the context hub runtime.

use bluetooth::BleGenericFilter;

use crate::proto::FilterMessageType;
use crate::timer::TimerId;

pub type EndpointId = u16;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostEndpointInfo {
    pub endpoint_id: EndpointId,
    /// None when the runtime could not resolve the client package.
    pub package_name: Option<String>,
}

/// Monotonic coprocessor clock.
pub trait Clock {
    fn now_ns(&self) -> u64;
    /// Offset to add to a coprocessor timestamp to get host time.
    fn estimated_host_time_offset_ns(&self) -> i64;
}

pub trait TimerService {
    /// Returns None when the runtime has no timer left.
    fn set_timer(&mut self, delay_ns: u64, one_shot: bool) -> Option<TimerId>;
    fn cancel_timer(&mut self, id: TimerId) -> bool;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BleCapabilities {
    pub scan: bool,
    pub scan_result_batching: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BleFilterCapabilities {
    pub service_data: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanMode {
    #[default]
    Background,
    Foreground,
    Aggressive,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BleScanFilter {
    /// None accepts any RSSI.
    pub rssi_threshold: Option<i8>,
    pub filters: Vec<BleGenericFilter>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BleRequestType {
    StartScan,
    StopScan,
    Flush,
}

/// Completion of an asynchronous BLE request. An `error_code` of 0 means
/// success.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AsyncResult {
    pub request_type: BleRequestType,
    pub error_code: u8,
    pub cookie: u32,
}

impl AsyncResult {
    pub const ERROR_NONE: u8 = 0;

    pub fn success(request_type: BleRequestType) -> Self {
        AsyncResult { request_type, error_code: Self::ERROR_NONE, cookie: 0 }
    }

    pub fn is_success(&self) -> bool {
        self.error_code == Self::ERROR_NONE
    }
}

/// Asynchronous BLE controller requests. A `true` return only means the
/// request was accepted; completion arrives later as an event.
pub trait BleDriver {
    fn capabilities(&self) -> BleCapabilities;
    fn filter_capabilities(&self) -> BleFilterCapabilities;
    fn start_scan(&mut self, mode: ScanMode, report_delay_ms: u32, filter: &BleScanFilter) -> bool;
    fn stop_scan(&mut self) -> bool;
    fn flush(&mut self) -> bool;
}

pub trait HostLink {
    fn send_message(
        &mut self,
        endpoint: EndpointId,
        message_type: FilterMessageType,
        payload: Vec<u8>,
    ) -> bool;
    fn host_endpoint_info(&self, endpoint: EndpointId) -> Option<HostEndpointInfo>;
}

pub trait Platform: Clock + TimerService + BleDriver + HostLink {}

impl<T: Clock + TimerService + BleDriver + HostLink> Platform for T {}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    pub struct SentMessage {
        pub endpoint: EndpointId,
        pub message_type: FilterMessageType,
        pub payload: Vec<u8>,
    }

    /// Records every request made through the platform traits.
    #[derive(Debug, Default)]
    pub struct FakePlatform {
        pub now_ns: u64,
        pub host_offset_ns: i64,
        pub capabilities: BleCapabilities,
        pub next_timer: u32,
        pub active_timers: Vec<(TimerId, u64, bool)>,
        pub scans: Vec<(ScanMode, u32, BleScanFilter)>,
        pub stops: usize,
        pub flushes: usize,
        pub sent: Vec<SentMessage>,
        pub endpoints: Vec<HostEndpointInfo>,
    }

    impl FakePlatform {
        pub fn new() -> Self {
            FakePlatform {
                capabilities: BleCapabilities { scan: true, scan_result_batching: true },
                ..Default::default()
            }
        }
    }

    impl Clock for FakePlatform {
        fn now_ns(&self) -> u64 {
            self.now_ns
        }

        fn estimated_host_time_offset_ns(&self) -> i64 {
            self.host_offset_ns
        }
    }

    impl TimerService for FakePlatform {
        fn set_timer(&mut self, delay_ns: u64, one_shot: bool) -> Option<TimerId> {
            self.next_timer += 1;
            let id = TimerId(self.next_timer);
            self.active_timers.push((id, delay_ns, one_shot));
            Some(id)
        }

        fn cancel_timer(&mut self, id: TimerId) -> bool {
            let before = self.active_timers.len();
            self.active_timers.retain(|(timer, _, _)| *timer != id);
            before != self.active_timers.len()
        }
    }

    impl BleDriver for FakePlatform {
        fn capabilities(&self) -> BleCapabilities {
            self.capabilities
        }

        fn filter_capabilities(&self) -> BleFilterCapabilities {
            BleFilterCapabilities { service_data: true }
        }

        fn start_scan(&mut self, mode: ScanMode, report_delay_ms: u32, filter: &BleScanFilter) -> bool {
            self.scans.push((mode, report_delay_ms, filter.clone()));
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

    impl HostLink for FakePlatform {
        fn send_message(
            &mut self,
            endpoint: EndpointId,
            message_type: FilterMessageType,
            payload: Vec<u8>,
        ) -> bool {
            self.sent.push(SentMessage { endpoint, message_type, payload });
            true
        }

        fn host_endpoint_info(&self, endpoint: EndpointId) -> Option<HostEndpointInfo> {
            self.endpoints.iter().find(|info| info.endpoint_id == endpoint).cloned()
        }
    }
}

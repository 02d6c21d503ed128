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

//! Owns the single hardware scan and composes its filters from the Nearby
//! defaults, the tracker and every extension endpoint.

use bluetooth::{BleDataTypeId, BleGenericFilter};
use log::{debug, error, info};

use crate::consts::{BATCH_SCAN_REPORT_DELAY_LOW_POWER_MS, FAST_PAIR_UUID, PRESENCE_UUID};
use crate::platform::{AsyncResult, BleDriver, BleRequestType, BleScanFilter, EndpointId, ScanMode, TimerService};
use crate::timer::{Timer, TimerId};

/// Service data filters for the Fast Pair and Presence UUIDs.
fn default_filters() -> Vec<BleGenericFilter> {
    [FAST_PAIR_UUID, PRESENCE_UUID]
        .into_iter()
        .filter_map(|uuid| {
            BleGenericFilter::new(BleDataTypeId::ServiceData16BitUuid as u8, &uuid.to_le_bytes(), &[0xFF, 0xFF]).ok()
        })
        .collect()
}

fn push_unique(filters: &mut Vec<BleGenericFilter>, filter: &BleGenericFilter) {
    if !filters.contains(filter) {
        filters.push(*filter);
    }
}

#[derive(Debug)]
struct EndpointFilters {
    endpoint: EndpointId,
    filters: Vec<BleGenericFilter>,
}

#[derive(Debug)]
pub struct BleScanner {
    scan_supported: bool,
    batch_supported: bool,
    started: bool,
    batch_flushing: bool,
    scan_mode: ScanMode,
    report_delay_ms: u32,
    default_filters_enabled: bool,
    tracker_filters_enabled: bool,
    tracker_filters: Vec<BleGenericFilter>,
    endpoint_filters: Vec<EndpointFilters>,
    keep_alive_timer: Timer,
}

impl BleScanner {
    pub fn new<D: BleDriver + ?Sized>(driver: &D, keep_alive_interval_ns: u64) -> Self {
        let capabilities = driver.capabilities();
        if !capabilities.scan {
            error!("BLE scan not supported");
        }
        if !driver.filter_capabilities().service_data {
            info!("BLE filter by service data not supported");
        }
        let report_delay_ms =
            if capabilities.scan_result_batching { BATCH_SCAN_REPORT_DELAY_LOW_POWER_MS } else { 0 };
        BleScanner {
            scan_supported: capabilities.scan,
            batch_supported: capabilities.scan_result_batching,
            started: false,
            batch_flushing: false,
            scan_mode: ScanMode::default(),
            report_delay_ms,
            default_filters_enabled: false,
            tracker_filters_enabled: false,
            tracker_filters: Vec::new(),
            endpoint_filters: Vec::new(),
            keep_alive_timer: Timer::new(keep_alive_interval_ns, false),
        }
    }

    pub fn start<P: BleDriver + TimerService + ?Sized>(&mut self, platform: &mut P) {
        if self.started {
            debug!("BLE scan already started");
            return;
        }
        self.restart(platform);
    }

    /// Stops a running scan and starts one with the current filter set.
    pub fn restart<P: BleDriver + TimerService + ?Sized>(&mut self, platform: &mut P) {
        if !self.scan_supported {
            error!("Failed to start BLE scan on an unsupported device");
            return;
        }
        if self.started && !platform.stop_scan() {
            error!("Failed to stop BLE scan before restarting it");
        }
        let scan_filter = BleScanFilter { rssi_threshold: None, filters: self.composed_filters() };
        if platform.start_scan(self.scan_mode, self.report_delay_ms, &scan_filter) {
            debug!(
                "Started BLE scan with {} filters, report delay {} ms",
                scan_filter.filters.len(),
                self.report_delay_ms
            );
            // Reset by a failed StartScan async result.
            self.started = true;
            self.keep_alive_timer.start(platform);
        } else {
            error!("Failed to start BLE scan");
            self.started = false;
        }
    }

    pub fn stop<P: BleDriver + TimerService + ?Sized>(&mut self, platform: &mut P) {
        if !self.started {
            debug!("BLE scan already stopped");
            return;
        }
        if platform.stop_scan() {
            debug!("Stopped BLE scan");
            self.started = false;
        } else {
            error!("Failed to stop BLE scan");
        }
        // Tracker storage still needs its refresh ticks.
        if self.tracker_filters.is_empty() {
            self.keep_alive_timer.stop(platform);
        }
    }

    /// Stops scanning and cancels the keep-alive timer.
    pub fn shutdown<P: BleDriver + TimerService + ?Sized>(&mut self, platform: &mut P) {
        self.stop(platform);
        self.keep_alive_timer.stop(platform);
    }

    /// Replaces the hardware filters of `endpoint`. An empty list removes the
    /// endpoint.
    pub fn update_filters(&mut self, endpoint: EndpointId, filters: Vec<BleGenericFilter>) -> bool {
        if let Some(index) = self.endpoint_filters.iter().position(|entry| entry.endpoint == endpoint) {
            if filters.is_empty() {
                self.endpoint_filters.remove(index);
            } else {
                self.endpoint_filters[index].filters = filters;
            }
            return true;
        }
        if filters.is_empty() {
            return true;
        }
        if self.endpoint_filters.try_reserve(1).is_err() {
            error!("Failed to add hardware filters of endpoint {}", endpoint);
            return false;
        }
        self.endpoint_filters.push(EndpointFilters { endpoint, filters });
        true
    }

    pub fn update_tracker_filters(&mut self, filters: Vec<BleGenericFilter>) {
        self.tracker_filters = filters;
    }

    pub fn set_default_filters(&mut self) {
        self.default_filters_enabled = true;
    }

    pub fn clear_default_filters(&mut self) {
        self.default_filters_enabled = false;
    }

    pub fn set_tracker_filters(&mut self) {
        self.tracker_filters_enabled = true;
    }

    pub fn clear_tracker_filters(&mut self) {
        self.tracker_filters_enabled = false;
    }

    /// Sets the report delay used by the next scan start. Returns true if
    /// the delay changed.
    pub fn set_report_delay_ms(&mut self, delay_ms: u32) -> bool {
        if !self.batch_supported {
            debug!("Batch scan is not supported");
            return false;
        }
        if self.report_delay_ms == delay_ms {
            return false;
        }
        self.report_delay_ms = delay_ms;
        true
    }

    /// Changes the report delay, restarting a running scan to apply it.
    pub fn update_batch_delay<P: BleDriver + TimerService + ?Sized>(&mut self, platform: &mut P, delay_ms: u32) {
        if self.set_report_delay_ms(delay_ms) && self.started {
            self.restart(platform);
        }
    }

    /// Asks the driver to deliver batched results now. Returns false if no
    /// flush is or will be in progress.
    pub fn flush<D: BleDriver + ?Sized>(&mut self, driver: &mut D) -> bool {
        if !self.batch_supported {
            debug!("Batch scan is not supported");
            return false;
        }
        if !self.started {
            error!("BLE scan was not started");
            return false;
        }
        if self.batch_flushing {
            debug!("Flushing BLE scan is already in progress");
            return true;
        }
        if !driver.flush() {
            error!("Failed to request a BLE flush");
            return false;
        }
        debug!("Flush batch scan results");
        self.batch_flushing = true;
        true
    }

    pub fn handle_flush_complete(&mut self, result: &AsyncResult) {
        debug!("Received flush complete event: error code {} cookie {}", result.error_code, result.cookie);
        if !result.is_success() {
            error!("Flush failed: {}", result.error_code);
        }
        self.batch_flushing = false;
    }

    pub fn handle_async_result<T: TimerService + ?Sized>(&mut self, timers: &mut T, result: &AsyncResult) {
        if result.is_success() {
            return;
        }
        error!(
            "BLE request {:?} failed with error code {}",
            result.request_type, result.error_code
        );
        if result.request_type == BleRequestType::StartScan {
            self.started = false;
            self.keep_alive_timer.stop(timers);
        }
    }

    pub fn is_keep_alive_timer(&self, id: TimerId) -> bool {
        self.keep_alive_timer.id() == Some(id)
    }

    pub fn is_available(&self) -> bool {
        self.scan_supported
    }

    pub fn is_batch_supported(&self) -> bool {
        self.batch_supported
    }

    pub fn is_scanning(&self) -> bool {
        self.started
    }

    pub fn is_flushing(&self) -> bool {
        self.batch_flushing
    }

    pub fn report_delay_ms(&self) -> u32 {
        self.report_delay_ms
    }

    /// Distinct filters of every enabled source, defaults first.
    pub fn composed_filters(&self) -> Vec<BleGenericFilter> {
        let mut filters = Vec::new();
        if self.default_filters_enabled {
            filters.extend(default_filters());
        }
        if self.tracker_filters_enabled {
            for filter in &self.tracker_filters {
                push_unique(&mut filters, filter);
            }
        }
        for entry in &self.endpoint_filters {
            for filter in &entry.filters {
                push_unique(&mut filters, filter);
            }
        }
        filters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakePlatform;
    use crate::platform::BleCapabilities;
    use proptest::prelude::*;

    fn filter(byte: u8) -> BleGenericFilter {
        BleGenericFilter::new(0x16, &[byte, 0xFE], &[0xFF, 0xFF]).unwrap()
    }

    fn scanner(platform: &FakePlatform) -> BleScanner {
        BleScanner::new(platform, 60_000)
    }

    #[test]
    fn restart_composes_filters() {
        let mut platform = FakePlatform::new();
        let mut scanner = scanner(&platform);
        scanner.set_default_filters();
        scanner.update_tracker_filters(vec![filter(1), filter(2)]);
        scanner.update_filters(7, vec![filter(2), filter(3)]);
        scanner.start(&mut platform);
        scanner.start(&mut platform);

        assert_eq!(platform.scans.len(), 1);
        let (mode, delay_ms, scan_filter) = &platform.scans[0];
        assert_eq!(*mode, ScanMode::Background);
        assert_eq!(*delay_ms, BATCH_SCAN_REPORT_DELAY_LOW_POWER_MS);
        // Tracker filters are left out until enabled.
        assert_eq!(scan_filter.filters, vec![default_filters()[0], default_filters()[1], filter(2), filter(3)]);
        assert_eq!(scan_filter.filters[0].data(), &[0x2C, 0xFE]);
        assert_eq!(scan_filter.filters[1].data(), &[0xF1, 0xFC]);

        scanner.set_tracker_filters();
        scanner.restart(&mut platform);
        assert_eq!(platform.stops, 1);
        assert_eq!(platform.scans[1].2.filters.len(), 5);
    }

    #[test]
    fn empty_update_removes_endpoint() {
        let platform = FakePlatform::new();
        let mut scanner = scanner(&platform);
        assert!(scanner.update_filters(7, vec![filter(1)]));
        assert!(scanner.update_filters(8, vec![filter(2)]));
        assert!(scanner.update_filters(7, Vec::new()));
        assert_eq!(scanner.composed_filters(), vec![filter(2)]);
    }

    #[test]
    fn keep_alive_survives_stop_with_tracker_filters() {
        let mut platform = FakePlatform::new();
        let mut scanner = scanner(&platform);
        scanner.start(&mut platform);
        let keep_alive = platform.active_timers[0].0;
        assert!(scanner.is_keep_alive_timer(keep_alive));

        scanner.update_tracker_filters(vec![filter(1)]);
        scanner.stop(&mut platform);
        assert!(!scanner.is_scanning());
        assert_eq!(platform.active_timers.len(), 1);

        scanner.update_tracker_filters(Vec::new());
        scanner.start(&mut platform);
        scanner.stop(&mut platform);
        assert!(platform.active_timers.is_empty());
    }

    #[test]
    fn start_scan_failure_resets_state() {
        let mut platform = FakePlatform::new();
        let mut scanner = scanner(&platform);
        scanner.start(&mut platform);
        let stop_failure = AsyncResult { request_type: BleRequestType::StopScan, error_code: 1, cookie: 0 };
        scanner.handle_async_result(&mut platform, &stop_failure);
        assert!(scanner.is_scanning());

        let start_failure = AsyncResult { request_type: BleRequestType::StartScan, error_code: 1, cookie: 0 };
        scanner.handle_async_result(&mut platform, &start_failure);
        assert!(!scanner.is_scanning());
        assert!(platform.active_timers.is_empty());
    }

    #[test]
    fn flush_is_single_flight() {
        let mut platform = FakePlatform::new();
        let mut scanner = scanner(&platform);
        assert!(!scanner.flush(&mut platform));
        scanner.start(&mut platform);
        assert!(scanner.flush(&mut platform));
        assert!(scanner.flush(&mut platform));
        assert_eq!(platform.flushes, 1);
        scanner.handle_flush_complete(&AsyncResult::success(BleRequestType::Flush));
        assert!(!scanner.is_flushing());
        assert!(scanner.flush(&mut platform));
        assert_eq!(platform.flushes, 2);
    }

    #[test]
    fn batch_delay_restarts_running_scan() {
        let mut platform = FakePlatform::new();
        let mut scanner = scanner(&platform);
        scanner.update_batch_delay(&mut platform, 500);
        assert!(platform.scans.is_empty());
        scanner.start(&mut platform);
        scanner.update_batch_delay(&mut platform, 500);
        assert_eq!(platform.scans.len(), 1);
        scanner.update_batch_delay(&mut platform, 200);
        assert_eq!(platform.scans.len(), 2);
        assert_eq!(platform.scans[1].1, 200);
    }

    #[test]
    fn unsupported_device_never_scans() {
        let mut platform = FakePlatform::new();
        platform.capabilities = BleCapabilities { scan: false, scan_result_batching: false };
        let mut scanner = scanner(&platform);
        assert!(!scanner.is_available());
        assert_eq!(scanner.report_delay_ms(), 0);
        scanner.start(&mut platform);
        assert!(platform.scans.is_empty());
        assert!(!scanner.set_report_delay_ms(100));
    }

    proptest! {
        #[test]
        fn composed_filters_are_distinct(
            updates in proptest::collection::vec(
                (0u16..4, proptest::collection::vec(0u8..6, 0..5)),
                0..12,
            ),
        ) {
            let platform = FakePlatform::new();
            let mut scanner = scanner(&platform);
            scanner.set_default_filters();
            for (endpoint, bytes) in updates {
                scanner.update_filters(endpoint, bytes.into_iter().map(filter).collect());
            }
            let composed = scanner.composed_filters();
            for (i, a) in composed.iter().enumerate() {
                prop_assert!(!composed[i + 1..].contains(a));
            }
        }
    }
}

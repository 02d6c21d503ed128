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

use bluetooth::{BleAdvertisingReport, BleGenericFilter};
use log::{debug, error, info};

use crate::consts::ONE_MILLISECOND_IN_NANOSECONDS;
use crate::nearby_extension::{ExtResult, ExtStatus};
use crate::platform::{EndpointId, HostEndpointInfo, TimerService};
use crate::proto::{TrackerBatchConfig, TrackerFilterConfig};
use crate::timer::{Timer, TimerId};
use crate::tracker_storage::TrackerStorage;

/// Transition of the tracker scan window caused by a timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerWindow {
    Opened,
    Closed,
}

/// Hardware filters of the tracker client. The filters are either scanned
/// continuously or only inside a window opened every active interval.
#[derive(Debug)]
pub struct TrackerFilter {
    host: Option<HostEndpointInfo>,
    hardware_filters: Vec<BleGenericFilter>,
    rssi_threshold: Option<i8>,
    batch_config: TrackerBatchConfig,
    active: bool,
    active_interval_timer: Timer,
    active_window_timer: Timer,
}

impl Default for TrackerFilter {
    fn default() -> Self {
        TrackerFilter {
            host: None,
            hardware_filters: Vec::new(),
            rssi_threshold: None,
            batch_config: TrackerBatchConfig::default(),
            active: false,
            active_interval_timer: Timer::new(0, false),
            active_window_timer: Timer::new(0, true),
        }
    }
}

impl TrackerFilter {
    pub fn new() -> Self {
        TrackerFilter::default()
    }

    /// Installs `config` for `host`. `hardware_filters` receives the filters
    /// the scanner should add while the tracker is active.
    pub fn update<T: TimerService + ?Sized>(
        &mut self,
        timers: &mut T,
        host: &HostEndpointInfo,
        config: &TrackerFilterConfig,
        hardware_filters: &mut Vec<BleGenericFilter>,
    ) -> ExtStatus {
        self.stop_timers(timers);
        self.active = false;
        self.hardware_filters.clear();
        hardware_filters.clear();

        if self.hardware_filters.try_reserve(config.hardware_filters.len()).is_err()
            || hardware_filters.try_reserve(config.hardware_filters.len()).is_err()
        {
            error!("Out of memory copying {} tracker filters", config.hardware_filters.len());
            return ExtStatus::new(ExtResult::OutOfResources, 0);
        }
        self.hardware_filters.extend_from_slice(&config.hardware_filters);
        hardware_filters.extend_from_slice(&config.hardware_filters);
        self.host = Some(host.clone());
        self.rssi_threshold = config.rssi_threshold;
        self.batch_config = config.batch_config;

        if self.is_empty() {
            info!("Tracker filters of endpoint {} removed", host.endpoint_id);
            return ExtStatus::default();
        }
        let interval_ms = config.active_interval_ms;
        let window_ms = config.active_window_ms;
        self.active = true;
        if window_ms == 0 || interval_ms <= window_ms {
            info!("Tracker scans continuously with {} filters", self.hardware_filters.len());
            return ExtStatus::default();
        }

        info!("Tracker scans {} ms out of every {} ms", window_ms, interval_ms);
        self.active_interval_timer
            .set_delay_ns(interval_ms as u64 * ONE_MILLISECOND_IN_NANOSECONDS);
        self.active_window_timer
            .set_delay_ns(window_ms as u64 * ONE_MILLISECOND_IN_NANOSECONDS);
        if !self.active_interval_timer.start(timers) || !self.active_window_timer.start(timers) {
            self.stop_timers(timers);
            self.active = false;
            return ExtStatus::new(ExtResult::InternalError, 0);
        }
        ExtStatus::default()
    }

    /// Handles `id` if it is one of the tracker timers.
    pub fn on_timer<T: TimerService + ?Sized>(
        &mut self,
        timers: &mut T,
        id: TimerId,
    ) -> Option<TrackerWindow> {
        if self.active_interval_timer.fired(id) {
            debug!("Tracker active window opens");
            self.active = true;
            self.active_window_timer.start(timers);
            return Some(TrackerWindow::Opened);
        }
        if self.active_window_timer.fired(id) {
            if self.is_empty() {
                return None;
            }
            debug!("Tracker active window closes");
            self.active = false;
            return Some(TrackerWindow::Closed);
        }
        None
    }

    pub fn stop_timers<T: TimerService + ?Sized>(&mut self, timers: &mut T) {
        self.active_interval_timer.stop(timers);
        self.active_window_timer.stop(timers);
    }

    /// Saves every report that passes the RSSI threshold and a hardware filter.
    pub fn match_and_save(&self, reports: &[BleAdvertisingReport], storage: &mut TrackerStorage) {
        if self.is_empty() {
            return;
        }
        for report in reports {
            let loud_enough = match self.rssi_threshold {
                None => true,
                Some(threshold) => report.rssi.is_some_and(|rssi| rssi >= threshold),
            };
            if loud_enough && self.hardware_filters.iter().any(|filter| filter.matches(&report.data)) {
                storage.push(report, &self.batch_config);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hardware_filters.is_empty()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn batch_config(&self) -> &TrackerBatchConfig {
        &self.batch_config
    }

    pub fn host_endpoint(&self) -> Option<EndpointId> {
        self.host.as_ref().map(|host| host.endpoint_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakePlatform;
    use bluetooth::{BleAddress, BleAddressKind};

    fn host() -> HostEndpointInfo {
        HostEndpointInfo { endpoint_id: 3, package_name: Some("com.example.tracker".to_string()) }
    }

    fn config(active_interval_ms: u32, active_window_ms: u32) -> TrackerFilterConfig {
        TrackerFilterConfig {
            hardware_filters: vec![BleGenericFilter::new(0x16, &[0xAA, 0xFE], &[0xFF, 0xFF]).unwrap()],
            rssi_threshold: Some(-70),
            active_interval_ms,
            active_window_ms,
            batch_config: TrackerBatchConfig {
                sample_interval_ms: 0,
                max_tracker_count: 8,
                max_history_count: 4,
                lost_timeout_ms: 1000,
                ..Default::default()
            },
        }
    }

    #[test]
    fn continuous_scan_needs_no_timers() {
        let mut platform = FakePlatform::new();
        let mut filter = TrackerFilter::new();
        let mut filters = Vec::new();
        assert!(filter.update(&mut platform, &host(), &config(1000, 0), &mut filters).result.is_ok());
        assert_eq!(filters.len(), 1);
        assert!(filter.is_active());
        assert!(platform.active_timers.is_empty());
        assert_eq!(filter.host_endpoint(), Some(3));
    }

    #[test]
    fn duty_cycle_opens_and_closes_window() {
        let mut platform = FakePlatform::new();
        let mut filter = TrackerFilter::new();
        filter.update(&mut platform, &host(), &config(10_000, 2_000), &mut Vec::new());
        assert!(filter.is_active());
        assert_eq!(platform.active_timers.len(), 2);
        let (interval, _, _) = platform.active_timers[0];
        let (window, delay_ns, one_shot) = platform.active_timers[1];
        assert_eq!(delay_ns, 2_000 * ONE_MILLISECOND_IN_NANOSECONDS);
        assert!(one_shot);

        assert_eq!(filter.on_timer(&mut platform, window), Some(TrackerWindow::Closed));
        assert!(!filter.is_active());
        assert_eq!(filter.on_timer(&mut platform, interval), Some(TrackerWindow::Opened));
        assert!(filter.is_active());
        assert_eq!(filter.on_timer(&mut platform, TimerId(999)), None);
    }

    #[test]
    fn removing_filters_stops_timers() {
        let mut platform = FakePlatform::new();
        let mut filter = TrackerFilter::new();
        filter.update(&mut platform, &host(), &config(10_000, 2_000), &mut Vec::new());
        let empty = TrackerFilterConfig::default();
        let mut filters = Vec::new();
        assert!(filter.update(&mut platform, &host(), &empty, &mut filters).result.is_ok());
        assert!(filter.is_empty());
        assert!(!filter.is_active());
        assert!(filters.is_empty());
        assert!(platform.active_timers.is_empty());
    }

    #[test]
    fn match_and_save_applies_rssi_threshold() {
        let mut platform = FakePlatform::new();
        let mut filter = TrackerFilter::new();
        filter.update(&mut platform, &host(), &config(1000, 0), &mut Vec::new());
        let data = vec![0x05, 0x16, 0xAA, 0xFE, 0x01, 0x02];
        let report = |addr, rssi| {
            BleAdvertisingReport::new(BleAddress::new(addr, BleAddressKind::Random), data.clone())
                .with_rssi(rssi)
        };
        let other = BleAdvertisingReport::new(BleAddress::new(9, BleAddressKind::Random), vec![0x02, 0x01, 0x06])
            .with_rssi(-10);

        let mut storage = TrackerStorage::new();
        filter.match_and_save(&[report(1, -60), report(2, -80), other], &mut storage);
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get_batch_reports()[0].report.address, [1, 0, 0, 0, 0, 0]);
    }
}

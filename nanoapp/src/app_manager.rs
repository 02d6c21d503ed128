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

//! Routes platform events through the caches, filters and scanner, and sends
//! the outcome to the host.

use bluetooth::BleAdvertisingReport;
use log::{debug, error, info, warn};

use crate::adv_report_cache::AdvReportCache;
use crate::ble_scanner::BleScanner;
use crate::consts::{
    BATCH_SCAN_REPORT_DELAY_LOW_POWER_MS, BLE_SCAN_KEEP_ALIVE_INTERVAL_NS, FILTER_ACK_SIZE,
    FILTER_RESULTS_BUF_SIZE, FILTER_RESULT_HEADER_SIZE, FP_FILTER_CACHE_EXPIRE_NS,
    ONE_MILLISECOND_IN_NANOSECONDS, ONE_SECOND_IN_NANOSECONDS, TRACKER_REPORTS_BUF_SIZE,
};
use crate::filter::Filter;
use crate::filter_extension::{FilterExtension, FilterExtensionResult};
use crate::nearby_extension::{ExtResult, ExtStatus, NearbyExtension};
use crate::platform::{AsyncResult, EndpointId, HostEndpointInfo, Platform};
use crate::proto::{
    self, AdvReport, BleConfig, BleFilterResult, BleFilterResults, ExtConfig, ExtConfigRequest,
    ExtConfigResponse, FilterMessageType,
};
use crate::timer::TimerId;
use crate::tracker_filter::{TrackerFilter, TrackerWindow};
use crate::tracker_storage::TrackerStorage;

/// Events delivered by the context hub runtime.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    HostMessage { endpoint: EndpointId, message_type: FilterMessageType, payload: Vec<u8> },
    BleAdvertisement(Vec<BleAdvertisingReport>),
    BleFlushComplete(AsyncResult),
    BleBatchComplete,
    BleAsyncResult(AsyncResult),
    Timer(TimerId),
    HostAwake,
    HostAsleep,
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::HostMessage { .. } => "HostMessage",
            Event::BleAdvertisement(_) => "BleAdvertisement",
            Event::BleFlushComplete(_) => "BleFlushComplete",
            Event::BleBatchComplete => "BleBatchComplete",
            Event::BleAsyncResult(_) => "BleAsyncResult",
            Event::Timer(_) => "Timer",
            Event::HostAwake => "HostAwake",
            Event::HostAsleep => "HostAsleep",
        }
    }
}

pub struct AppManager<P: Platform> {
    platform: P,
    adv_reports_cache: AdvReportCache,
    filter: Filter,
    filter_extension: FilterExtension,
    tracker_filter: TrackerFilter,
    tracker_storage: TrackerStorage,
    ble_scanner: BleScanner,
    // Endpoint of the client that installed the Nearby filters.
    host_endpoint: EndpointId,
    screen_on: bool,
    fp_screen_on_sent: bool,
    fp_filter_cache_results: Vec<BleFilterResult>,
    fp_filter_cache_time_ns: u64,
    fp_filter_cache_expire_ns: u64,
    screen_on_filter_extension_results: Vec<FilterExtensionResult>,
    last_tracker_report_flush_time_ns: u64,
}

impl<P: Platform> AppManager<P> {
    pub fn new(platform: P, extension: Box<dyn NearbyExtension>) -> Self {
        Self::with_keep_alive_interval_ns(platform, extension, BLE_SCAN_KEEP_ALIVE_INTERVAL_NS)
    }

    pub fn with_keep_alive_interval_ns(
        platform: P,
        extension: Box<dyn NearbyExtension>,
        keep_alive_interval_ns: u64,
    ) -> Self {
        let now_ns = platform.now_ns();
        let ble_scanner = BleScanner::new(&platform, keep_alive_interval_ns);
        AppManager {
            platform,
            adv_reports_cache: AdvReportCache::default(),
            filter: Filter::new(),
            filter_extension: FilterExtension::new(extension),
            tracker_filter: TrackerFilter::new(),
            tracker_storage: TrackerStorage::new(),
            ble_scanner,
            host_endpoint: 0,
            screen_on: false,
            fp_screen_on_sent: false,
            fp_filter_cache_results: Vec::new(),
            fp_filter_cache_time_ns: now_ns,
            fp_filter_cache_expire_ns: FP_FILTER_CACHE_EXPIRE_NS,
            screen_on_filter_extension_results: Vec::new(),
            last_tracker_report_flush_time_ns: now_ns,
        }
    }

    /// True only when the platform can scan.
    pub fn is_initialized(&self) -> bool {
        self.ble_scanner.is_available()
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn ble_scanner(&self) -> &BleScanner {
        &self.ble_scanner
    }

    pub fn tracker_storage(&self) -> &TrackerStorage {
        &self.tracker_storage
    }

    /// Stops the scan and every timer.
    pub fn shutdown(&mut self) {
        info!("Nearby app manager shutting down");
        self.ble_scanner.shutdown(&mut self.platform);
        self.tracker_filter.stop_timers(&mut self.platform);
    }

    pub fn handle_event(&mut self, event: Event) {
        let wakeup_start_ns = self.platform.now_ns();
        let name = event.name();
        debug!("Wakeup starts by event {}", name);
        match event {
            Event::HostMessage { endpoint, message_type, payload } => {
                self.handle_message_from_host(endpoint, message_type, &payload)
            }
            Event::BleAdvertisement(reports) => {
                debug!("Received {} BLE reports", reports.len());
                let now_ns = self.platform.now_ns();
                for report in &reports {
                    self.adv_reports_cache.push(report, now_ns);
                }
                // With batching the match waits for the batch complete event.
                if !self.ble_scanner.is_batch_supported() {
                    self.handle_match_adv_reports();
                }
            }
            Event::BleFlushComplete(result) => self.ble_scanner.handle_flush_complete(&result),
            Event::BleBatchComplete => self.handle_match_adv_reports(),
            Event::BleAsyncResult(result) => {
                self.ble_scanner.handle_async_result(&mut self.platform, &result)
            }
            Event::Timer(id) => self.handle_timer_event(id),
            Event::HostAwake => self.handle_host_awake_event(),
            Event::HostAsleep => debug!("Host went to sleep"),
        }
        let wakeup_duration_ns = self.platform.now_ns().saturating_sub(wakeup_start_ns);
        debug!("Wakeup ends after {} ns by event {}", wakeup_duration_ns, name);
    }

    fn handle_match_adv_reports(&mut self) {
        let now_ns = self.platform.now_ns();
        let reports = self.adv_reports_cache.take(now_ns);
        let host_time_offset_ns = self.platform.estimated_host_time_offset_ns();

        let mut filter_results = Vec::new();
        let mut fp_filter_results = Vec::new();
        for report in reports.iter().filter(|report| !report.data.is_empty()) {
            self.filter.match_ble(report, host_time_offset_ns, &mut filter_results, &mut fp_filter_results);
        }
        if !filter_results.is_empty() {
            debug!("Send filter results back");
            send_bulk_filter_results(&mut self.platform, self.host_endpoint, &filter_results);
        }
        if !fp_filter_results.is_empty() {
            // The Fast Pair host wants scan results once per screen on.
            if self.screen_on && !self.fp_screen_on_sent {
                debug!("Send Fast Pair filter results back");
                send_bulk_filter_results(&mut self.platform, self.host_endpoint, &fp_filter_results);
                self.fp_screen_on_sent = true;
            }
            self.fp_filter_cache_results = fp_filter_results;
            self.fp_filter_cache_time_ns = now_ns;
        }

        self.tracker_filter.match_and_save(&reports, &mut self.tracker_storage);
        if self.tracker_storage.take_full_event() {
            self.send_tracker_storage_full_event();
        }

        let mut filter_extension_results = Vec::new();
        self.filter_extension.match_reports(
            &reports,
            now_ns,
            &mut filter_extension_results,
            &mut self.screen_on_filter_extension_results,
        );
        if !filter_extension_results.is_empty() {
            send_filter_extension_results(&mut self.platform, &mut filter_extension_results, now_ns);
        }
        if !self.screen_on_filter_extension_results.is_empty() {
            if self.screen_on {
                debug!("Send screen on filter extension results back");
                self.flush_screen_on_filter_extension_results(now_ns);
            } else {
                for result in &mut self.screen_on_filter_extension_results {
                    result.refresh_if_needed(now_ns);
                }
            }
        }
    }

    fn flush_screen_on_filter_extension_results(&mut self, now_ns: u64) {
        let mut results = std::mem::take(&mut self.screen_on_filter_extension_results);
        send_filter_extension_results(&mut self.platform, &mut results, now_ns);
    }

    fn handle_message_from_host(&mut self, endpoint: EndpointId, message_type: FilterMessageType, payload: &[u8]) {
        debug!(
            "Got message from host with type {:?} size {} endpoint {:#06x}",
            message_type,
            payload.len(),
            endpoint
        );
        match message_type {
            FilterMessageType::Filters => {
                self.host_endpoint = endpoint;
                let updated = self.filter.update(payload);
                self.respond_host_set_filter_request(updated);
                self.fp_screen_on_sent = false;
                if self.filter.is_empty() {
                    self.ble_scanner.clear_default_filters();
                } else {
                    self.ble_scanner.set_default_filters();
                }
                let delay_ms = self.filter.min_latency_ms().unwrap_or(BATCH_SCAN_REPORT_DELAY_LOW_POWER_MS);
                self.ble_scanner.set_report_delay_ms(delay_ms);
                self.update_ble_scan_state();
            }
            FilterMessageType::Config => self.handle_host_config_request(payload),
            FilterMessageType::ExtConfigRequest => self.handle_host_ext_config_request(endpoint, payload),
            other => warn!("Ignoring host message of type {:?}", other),
        }
    }

    fn update_ble_scan_state(&mut self) {
        let tracker_scanning = !self.tracker_filter.is_empty() && self.tracker_filter.is_active();
        if !self.filter.is_empty() || tracker_scanning || !self.filter_extension.is_empty() {
            self.ble_scanner.restart(&mut self.platform);
        } else {
            self.ble_scanner.stop(&mut self.platform);
        }
    }

    fn respond_host_set_filter_request(&mut self, success: bool) {
        let message_type = if success { FilterMessageType::Success } else { FilterMessageType::Failure };
        info!("Acknowledge filter config");
        if self.platform.send_message(self.host_endpoint, message_type, vec![0; FILTER_ACK_SIZE]) {
            info!("Succeeded to acknowledge filter update");
        } else {
            error!("Failed to acknowledge filter update");
        }
    }

    fn handle_host_config_request(&mut self, payload: &[u8]) {
        let config = match proto::decode::<BleConfig>(payload) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to decode config message: {}", e);
                return;
            }
        };
        if let Some(screen_on) = config.screen_on {
            debug!("Received screen config {}", screen_on);
            self.screen_on = screen_on;
            if screen_on {
                self.handle_screen_on();
            }
        }
        if let Some(expire_sec) = config.fast_pair_cache_expire_time_sec {
            self.fp_filter_cache_expire_ns = expire_sec as u64 * ONE_SECOND_IN_NANOSECONDS;
        }
    }

    fn handle_screen_on(&mut self) {
        self.fp_screen_on_sent = false;
        if self.ble_scanner.is_scanning() {
            self.ble_scanner.flush(&mut self.platform);
        }
        let now_ns = self.platform.now_ns();
        if !self.fp_filter_cache_results.is_empty() {
            // Screen on arrives for both screen on and unlock, so the cache
            // is kept until it expires.
            if now_ns.saturating_sub(self.fp_filter_cache_time_ns) < self.fp_filter_cache_expire_ns {
                debug!("Send Fast Pair filter results from cache");
                send_bulk_filter_results(&mut self.platform, self.host_endpoint, &self.fp_filter_cache_results);
            } else {
                self.fp_filter_cache_results.clear();
            }
        }
        if !self.screen_on_filter_extension_results.is_empty() {
            debug!("Send filter extension results from cache");
            self.flush_screen_on_filter_extension_results(now_ns);
        }
    }

    fn handle_host_ext_config_request(&mut self, endpoint: EndpointId, payload: &[u8]) {
        let mut response = ExtConfigResponse::default();
        match proto::decode::<ExtConfigRequest>(payload) {
            Err(e) => error!("Failed to decode extended config message: {}", e),
            Ok(request) => {
                response.request_id = request.request_id;
                let status = match self.platform.host_endpoint_info(endpoint) {
                    None => {
                        error!("Failed to get host info of endpoint {}", endpoint);
                        ExtStatus::new(ExtResult::InternalError, 0)
                    }
                    Some(host) if host.package_name.is_none() => {
                        error!("Failed to get package name of endpoint {}", endpoint);
                        ExtStatus::new(ExtResult::UnknownPackage, 0)
                    }
                    Some(host) => self.handle_ext_config(&host, request.config),
                };
                response.result = status.result;
                response.vendor_status = status.vendor_status;
            }
        }
        self.send_ext_config_response(endpoint, &response);
    }

    fn handle_ext_config(&mut self, host: &HostEndpointInfo, config: Option<ExtConfig>) -> ExtStatus {
        let Some(config) = config else {
            error!("Unknown extended config");
            return ExtStatus::new(ExtResult::FeatureNotSupported, 0);
        };
        debug!("Receiving {} extended config", config.name());
        match config {
            ExtConfig::FilterConfig(config) => {
                let mut hardware_filters = Vec::new();
                let status = self.filter_extension.update(host, &config, &mut hardware_filters);
                if !status.result.is_ok() {
                    error!("Failed to handle extended filter config");
                    self.ble_scanner.update_filters(host.endpoint_id, Vec::new());
                    self.update_ble_scan_state();
                    return status;
                }
                if !self.ble_scanner.update_filters(host.endpoint_id, hardware_filters) {
                    return ExtStatus::new(ExtResult::InternalError, 0);
                }
                self.update_ble_scan_state();
                status
            }
            ExtConfig::ServiceConfig(config) => self.filter_extension.configure_service(host, &config),
            ExtConfig::TrackerFilterConfig(config) => {
                let mut hardware_filters = Vec::new();
                let status =
                    self.tracker_filter.update(&mut self.platform, host, &config, &mut hardware_filters);
                if !status.result.is_ok() {
                    error!("Failed to update tracker filters: {:?}", status.result);
                    return status;
                }
                self.ble_scanner.update_tracker_filters(hardware_filters);
                if self.tracker_filter.is_active() {
                    self.ble_scanner.set_tracker_filters();
                } else {
                    self.ble_scanner.clear_tracker_filters();
                }
                self.update_ble_scan_state();
                // Reports collected so far belong to the removed tracker.
                if self.tracker_filter.is_empty() {
                    self.send_tracker_reports();
                    self.tracker_storage.clear();
                }
                status
            }
            ExtConfig::FlushTrackerReports => {
                debug!(
                    "Flush tracker reports by host: id {} package {}",
                    host.endpoint_id,
                    host.package_name.as_deref().unwrap_or("unknown")
                );
                self.send_tracker_reports();
                self.tracker_storage.clear();
                ExtStatus::default()
            }
        }
    }

    fn send_ext_config_response(&mut self, endpoint: EndpointId, response: &ExtConfigResponse) {
        let payload = match proto::encode(response, FILTER_RESULTS_BUF_SIZE) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode extended config response: {}", e);
                return;
            }
        };
        if self.platform.send_message(endpoint, FilterMessageType::ExtConfigResponse, payload) {
            debug!("Sent the extended config response for request {}", response.request_id);
        } else {
            error!("Failed to send extended config response for request {}", response.request_id);
        }
    }

    fn handle_host_awake_event(&mut self) {
        let now_ns = self.platform.now_ns();
        let threshold_ns = self.tracker_filter.batch_config().opportunistic_flush_threshold_ms as u64
            * ONE_MILLISECOND_IN_NANOSECONDS;
        if now_ns.saturating_sub(self.last_tracker_report_flush_time_ns) >= threshold_ns {
            debug!("Flush tracker reports by host awake event");
            self.send_tracker_reports();
            self.tracker_storage.clear();
        }
    }

    fn handle_timer_event(&mut self, id: TimerId) {
        if self.ble_scanner.is_keep_alive_timer(id) {
            let now_ms = self.platform.now_ns() / ONE_MILLISECOND_IN_NANOSECONDS;
            self.tracker_storage.refresh(self.tracker_filter.batch_config(), now_ms);
            return;
        }
        match self.tracker_filter.on_timer(&mut self.platform, id) {
            Some(TrackerWindow::Opened) => {
                self.ble_scanner.set_tracker_filters();
                self.update_ble_scan_state();
            }
            Some(TrackerWindow::Closed) => {
                self.ble_scanner.clear_tracker_filters();
                self.update_ble_scan_state();
            }
            None => debug!("Ignoring timer {:?}", id),
        }
    }

    fn send_tracker_storage_full_event(&mut self) {
        let Some(endpoint) = self.tracker_filter.host_endpoint() else {
            return;
        };
        info!("Send tracker storage full event");
        if !self.platform.send_message(endpoint, FilterMessageType::ExtStorageFullEvent, Vec::new()) {
            error!("Failed to send tracker storage full event");
        }
    }

    fn send_tracker_reports(&mut self) {
        self.last_tracker_report_flush_time_ns = self.platform.now_ns();
        let Some(endpoint) = self.tracker_filter.host_endpoint() else {
            return;
        };
        for report in self.tracker_storage.get_batch_reports() {
            let payload = match proto::encode(&report, TRACKER_REPORTS_BUF_SIZE) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to encode tracker report: {}", e);
                    return;
                }
            };
            if !self.platform.send_message(endpoint, FilterMessageType::TrackerReport, payload) {
                error!("Failed to send tracker report");
            }
        }
    }
}

/// Sends `results` in one message if they fit the send buffer, one message
/// per result otherwise.
fn send_bulk_filter_results<P: Platform + ?Sized>(
    platform: &mut P,
    endpoint: EndpointId,
    results: &[BleFilterResult],
) {
    let mut encoded_size = 0;
    for result in results {
        match proto::encoded_size(result) {
            Ok(size) => encoded_size += size + FILTER_RESULT_HEADER_SIZE,
            Err(e) => {
                error!("Failed to get encoded size of filter result: {}", e);
                return;
            }
        }
    }
    if encoded_size <= FILTER_RESULTS_BUF_SIZE {
        send_filter_results(platform, endpoint, results);
        return;
    }
    debug!(
        "Encoded size {} exceeds buffer size {}, sending each result",
        encoded_size, FILTER_RESULTS_BUF_SIZE
    );
    for result in results {
        send_filter_results(platform, endpoint, std::slice::from_ref(result));
    }
}

fn send_filter_results<P: Platform + ?Sized>(platform: &mut P, endpoint: EndpointId, results: &[BleFilterResult]) {
    let message = BleFilterResults { results: results.to_vec() };
    let payload = match proto::encode(&message, FILTER_RESULTS_BUF_SIZE) {
        Ok(payload) => payload,
        Err(e) => {
            error!("Unable to encode filter results: {}", e);
            return;
        }
    };
    if platform.send_message(endpoint, FilterMessageType::FilterResults, payload) {
        debug!("Sent {} filter results", results.len());
    } else {
        error!("Failed to send filter results");
    }
}

/// Sends every live report of `results`, one message per report.
fn send_filter_extension_results<P: Platform + ?Sized>(
    platform: &mut P,
    results: &mut [FilterExtensionResult],
    now_ns: u64,
) {
    for result in results {
        let endpoint = result.endpoint;
        for report in result.reports(now_ns) {
            let payload = match proto::encode(&AdvReport::from(report), FILTER_RESULTS_BUF_SIZE) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to encode filter extension result: {}", e);
                    return;
                }
            };
            if !platform.send_message(endpoint, FilterMessageType::FilterResults, payload) {
                error!("Failed to send filter extension result");
            }
        }
    }
}

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

//! Per host endpoint filters evaluated by the vendor extension.

use bluetooth::{BleAdvertisingReport, BleGenericFilter};
use log::{debug, error, info};

use crate::adv_report_cache::AdvReportCache;
use crate::consts::{ADV_REPORT_CACHE_NO_EXPIRY_NS, ONE_MILLISECOND_IN_NANOSECONDS};
use crate::nearby_extension::{ExtMatch, ExtResult, ExtStatus, NearbyExtension};
use crate::platform::{EndpointId, HostEndpointInfo};
use crate::proto::{ExtFilterConfig, ExtServiceConfig};

/// Reports waiting for delivery to one host endpoint.
#[derive(Clone, Debug)]
pub struct FilterExtensionResult {
    pub endpoint: EndpointId,
    reports: AdvReportCache,
}

impl FilterExtensionResult {
    pub fn new(endpoint: EndpointId, expire_time_ns: u64) -> Self {
        FilterExtensionResult { endpoint, reports: AdvReportCache::new(expire_time_ns) }
    }

    pub fn push(&mut self, report: &BleAdvertisingReport, now_ns: u64) -> bool {
        self.reports.push(report, now_ns)
    }

    pub fn reports(&mut self, now_ns: u64) -> &[BleAdvertisingReport] {
        self.reports.get(now_ns)
    }

    pub fn refresh_if_needed(&mut self, now_ns: u64) {
        self.reports.refresh_if_needed(now_ns)
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

#[derive(Debug)]
struct ExtFilterEntry {
    host: HostEndpointInfo,
    cache_expire_ms: u32,
}

pub struct FilterExtension {
    entries: Vec<ExtFilterEntry>,
    extension: Box<dyn NearbyExtension>,
}

impl FilterExtension {
    pub fn new(extension: Box<dyn NearbyExtension>) -> Self {
        FilterExtension { entries: Vec::new(), extension }
    }

    /// Hands `config` to the extension and records the endpoint.
    /// `hardware_filters` receives the filters the scanner should
    /// install for this endpoint; it is left empty when the endpoint ends up
    /// removed.
    pub fn update(
        &mut self,
        host: &HostEndpointInfo,
        config: &ExtFilterConfig,
        hardware_filters: &mut Vec<BleGenericFilter>,
    ) -> ExtStatus {
        hardware_filters.clear();
        let status =
            self.extension.set_filter_config(host, &config.hardware_filters, &config.oem_filter);
        if !status.result.is_ok() {
            error!(
                "Extension rejected filter config of endpoint {}: {:?} vendor status {}",
                host.endpoint_id, status.result, status.vendor_status
            );
            self.remove(host.endpoint_id);
            return status;
        }
        if config.hardware_filters.is_empty() && config.oem_filter.is_empty() {
            info!("Removing extension filters of endpoint {}", host.endpoint_id);
            self.remove(host.endpoint_id);
            return status;
        }

        if hardware_filters.try_reserve(config.hardware_filters.len()).is_err() {
            error!("Out of memory copying {} hardware filters", config.hardware_filters.len());
            self.remove(host.endpoint_id);
            return ExtStatus::new(ExtResult::OutOfResources, 0);
        }
        hardware_filters.extend_from_slice(&config.hardware_filters);

        match self.entries.iter_mut().find(|entry| entry.host.endpoint_id == host.endpoint_id) {
            Some(entry) => {
                entry.host = host.clone();
                entry.cache_expire_ms = config.cache_expire_ms;
            }
            None => {
                if self.entries.try_reserve(1).is_err() {
                    hardware_filters.clear();
                    return ExtStatus::new(ExtResult::OutOfResources, 0);
                }
                self.entries.push(ExtFilterEntry {
                    host: host.clone(),
                    cache_expire_ms: config.cache_expire_ms,
                });
            }
        }
        status
    }

    pub fn configure_service(&mut self, host: &HostEndpointInfo, config: &ExtServiceConfig) -> ExtStatus {
        let status = self.extension.set_service_config(host, &config.data);
        if !status.result.is_ok() {
            error!(
                "Extension rejected service config of endpoint {}: {:?} vendor status {}",
                host.endpoint_id, status.result, status.vendor_status
            );
        }
        status
    }

    fn remove(&mut self, endpoint: EndpointId) {
        self.entries.retain(|entry| entry.host.endpoint_id != endpoint);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Asks the extension about every report on behalf of every endpoint and
    /// files accepted reports into the endpoint's `immediate` or `on_wake`
    /// bucket. On-wake buckets expire after the endpoint's cache expiry.
    pub fn match_reports(
        &mut self,
        reports: &[BleAdvertisingReport],
        now_ns: u64,
        immediate: &mut Vec<FilterExtensionResult>,
        on_wake: &mut Vec<FilterExtensionResult>,
    ) {
        for entry in &self.entries {
            for report in reports {
                let (bucket, expire_time_ns) = match self.extension.match_report(&entry.host, report) {
                    ExtMatch::Ignore => continue,
                    ExtMatch::DeliverImmediately => (&mut *immediate, ADV_REPORT_CACHE_NO_EXPIRY_NS),
                    ExtMatch::DeliverOnWake => (
                        &mut *on_wake,
                        (entry.cache_expire_ms as u64).saturating_mul(ONE_MILLISECOND_IN_NANOSECONDS),
                    ),
                };
                let endpoint = entry.host.endpoint_id;
                let index = match bucket.iter().position(|result| result.endpoint == endpoint) {
                    Some(index) => index,
                    None => {
                        if bucket.try_reserve(1).is_err() {
                            error!("Dropping extension result for endpoint {}", endpoint);
                            continue;
                        }
                        bucket.push(FilterExtensionResult::new(endpoint, expire_time_ns));
                        bucket.len() - 1
                    }
                };
                if !bucket[index].push(report, now_ns) {
                    debug!("Extension result cache of endpoint {} is full", endpoint);
                }
            }
        }
    }
}

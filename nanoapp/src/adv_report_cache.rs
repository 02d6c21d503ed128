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

use bluetooth::BleAdvertisingReport;
use log::{debug, error};

use crate::consts::{ADV_REPORT_CACHE_NO_EXPIRY_NS, ADV_REPORT_CACHE_REFRESH_THRESHOLD};

/// Recent advertising reports, one per `(address, address type, data)`.
///
/// Duplicates merge into the cached entry keeping the strongest RSSI and the
/// latest timestamp.
#[derive(Clone, Debug)]
pub struct AdvReportCache {
    reports: Vec<BleAdvertisingReport>,
    expire_time_ns: u64,
}

impl Default for AdvReportCache {
    fn default() -> Self {
        AdvReportCache::new(ADV_REPORT_CACHE_NO_EXPIRY_NS)
    }
}

impl AdvReportCache {
    pub fn new(expire_time_ns: u64) -> Self {
        AdvReportCache { reports: Vec::new(), expire_time_ns }
    }

    /// Merges `report` into the cache. Returns false when the report had to
    /// be dropped because the cache could not grow.
    pub fn push(&mut self, report: &BleAdvertisingReport, now_ns: u64) -> bool {
        if let Some(cached) = self.reports.iter_mut().find(|cached| cached.same_key(report)) {
            // None orders below every Some, so it acts as minus infinity.
            cached.rssi = cached.rssi.max(report.rssi);
            cached.timestamp_ns = cached.timestamp_ns.max(report.timestamp_ns);
            return true;
        }
        if self.reports.try_reserve(1).is_err() {
            error!("Failed to cache an advertising report of {} bytes", report.data.len());
            self.refresh(now_ns);
            return false;
        }
        self.reports.push(report.clone());
        true
    }

    /// Drops reports older than the expiry.
    pub fn refresh(&mut self, now_ns: u64) {
        if self.expire_time_ns == ADV_REPORT_CACHE_NO_EXPIRY_NS {
            return;
        }
        let expire_time_ns = self.expire_time_ns;
        let before = self.reports.len();
        self.reports
            .retain(|report| now_ns.saturating_sub(report.timestamp_ns) <= expire_time_ns);
        if before != self.reports.len() {
            debug!("Expired {} cached reports", before - self.reports.len());
        }
    }

    pub fn refresh_if_needed(&mut self, now_ns: u64) {
        if self.reports.len() > ADV_REPORT_CACHE_REFRESH_THRESHOLD {
            self.refresh(now_ns);
        }
    }

    /// Live reports, after expiring stale ones.
    pub fn get(&mut self, now_ns: u64) -> &[BleAdvertisingReport] {
        self.refresh(now_ns);
        &self.reports
    }

    /// Moves the live reports out, leaving the cache empty.
    pub fn take(&mut self, now_ns: u64) -> Vec<BleAdvertisingReport> {
        self.refresh(now_ns);
        std::mem::take(&mut self.reports)
    }

    pub fn clear(&mut self) {
        self.reports.clear();
        self.reports.shrink_to_fit();
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }
}

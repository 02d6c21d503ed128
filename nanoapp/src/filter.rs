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

use bluetooth::{BleAdvertisingReport, ServiceData};
use log::{debug, error, info};

use crate::crypto::CryptoV1;
use crate::fast_pair_filter::{match_initial_pair, match_subsequent_pair};
use crate::presence_filter::{match_presence_v0, match_presence_v1};
use crate::proto::{self, BleFilterResult, BleFilters, ResultType};

/// Serializes service data the way results carry it:
/// `[len(uuid + data)] ++ uuid_le ++ data`. Empty if it cannot be framed.
pub(crate) fn service_data_bytes(service_data: &ServiceData) -> Vec<u8> {
    let Ok(length) = u8::try_from(service_data.data().len() + 2) else {
        debug!("Service data of {} bytes is too long to report", service_data.data().len());
        return Vec::new();
    };
    let mut bytes = Vec::with_capacity(length as usize + 1);
    bytes.push(length);
    bytes.extend_from_slice(&service_data.uuid().to_le_bytes());
    bytes.extend_from_slice(service_data.data());
    bytes
}

/// Appends `result`, dropping it when `results` cannot grow.
pub(crate) fn push_result(results: &mut Vec<BleFilterResult>, result: BleFilterResult) {
    if results.try_reserve(1).is_err() {
        error!("Dropping filter result {}: out of memory", result.id);
        return;
    }
    results.push(result);
}

/// The Nearby filters installed by the host.
#[derive(Debug, Default)]
pub struct Filter {
    filters: BleFilters,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    /// Replaces the filters with the encoded `BleFilters` in `message`. A
    /// message that fails to decode leaves the current filters in place.
    pub fn update(&mut self, message: &[u8]) -> bool {
        match proto::decode::<BleFilters>(message) {
            Ok(filters) => {
                info!("Installed {} Nearby filters", filters.filters.len());
                self.filters = filters;
                true
            }
            Err(e) => {
                error!("Failed to decode BleFilters: {}", e);
                false
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.filters.is_empty()
    }

    /// The tightest latency budget requested by any filter.
    pub fn min_latency_ms(&self) -> Option<u32> {
        self.filters.filters.iter().filter_map(|filter| filter.latency_ms).min()
    }

    /// Matches `report` against every filter in order. Fast Pair results go to
    /// `fp_results`, Presence results to `results`.
    pub fn match_ble(
        &self,
        report: &BleAdvertisingReport,
        host_time_offset_ns: i64,
        results: &mut Vec<BleFilterResult>,
        fp_results: &mut Vec<BleFilterResult>,
    ) {
        let scan_record = report.scan_record();
        if scan_record.service_data.is_empty() {
            return;
        }
        let crypto = CryptoV1::mic();
        let timestamp_ns = report.timestamp_ns.saturating_add_signed(host_time_offset_ns);

        for filter in &self.filters.filters {
            let mut result = BleFilterResult {
                id: filter.id,
                tx_power: report.tx_power,
                rssi: report.rssi,
                bluetooth_address: *report.address.bytes(),
                timestamp_ns,
                ..Default::default()
            };
            let matched = match_initial_pair(filter, &scan_record, &mut result)
                || match_subsequent_pair(filter, &scan_record, &mut result)
                || match_presence_v0(filter, &scan_record, &mut result)
                || match_presence_v1(filter, &scan_record, &crypto, &mut result);
            if !matched {
                continue;
            }
            debug!("Filter {} matched a {:?} advertisement", filter.id, result.result_type);
            if result.result_type == ResultType::FastPair {
                push_result(fp_results, result);
            } else {
                push_result(results, result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{BleFilter, DataElement};
    use bluetooth::{BleAddress, BleAddressKind};

    fn report(data: &[u8]) -> BleAdvertisingReport {
        BleAdvertisingReport::new(BleAddress::new(0x0A0B0C0D0E0F, BleAddressKind::Random), data.to_vec())
            .with_rssi(-50)
            .with_timestamp_ns(1_000)
    }

    fn installed(filters: Vec<BleFilter>) -> Filter {
        let mut filter = Filter::new();
        let message = proto::encode(&BleFilters { filters }, 1024).unwrap();
        assert!(filter.update(&message));
        filter
    }

    #[test]
    fn update_keeps_filters_on_decode_failure() {
        let mut filter = installed(vec![BleFilter { latency_ms: Some(500), ..Default::default() }]);
        assert!(!filter.update(&[0xFF, 0xFF, 0xFF]));
        assert!(!filter.is_empty());
        assert_eq!(filter.min_latency_ms(), Some(500));
    }

    #[test]
    fn min_latency_across_filters() {
        let filter = installed(vec![
            BleFilter { latency_ms: Some(500), ..Default::default() },
            BleFilter::default(),
            BleFilter { latency_ms: Some(200), ..Default::default() },
        ]);
        assert_eq!(filter.min_latency_ms(), Some(200));
        assert_eq!(Filter::new().min_latency_ms(), None);
    }

    #[test]
    fn match_routes_fast_pair_and_presence() {
        let filter = installed(vec![
            BleFilter {
                id: 1,
                data_elements: vec![DataElement::new(DataElement::FAST_PAIR_ACCOUNT_KEY, [0u8; 16])],
                ..Default::default()
            },
            BleFilter { id: 2, intent: Some(5), ..Default::default() },
        ]);
        let (mut results, mut fp_results) = (Vec::new(), Vec::new());
        filter.match_ble(&report(&[0x06, 0x16, 0x2C, 0xFE, 0x1F, 0xD7, 0xD0]), 500, &mut results, &mut fp_results);
        filter.match_ble(&report(&[0x07, 0x16, 0xF1, 0xFC, 0x02, 0x26, 0x01, 0x05]), 500, &mut results, &mut fp_results);

        assert_eq!(fp_results.len(), 1);
        assert_eq!(fp_results[0].id, 1);
        assert_eq!(fp_results[0].timestamp_ns, 1_500);
        assert_eq!(fp_results[0].bluetooth_address, [0x0F, 0x0E, 0x0D, 0x0C, 0x0B, 0x0A]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, 2);
        assert_eq!(results[0].intent, Some(5));
        assert_eq!(results[0].rssi, Some(-50));
    }

    #[test]
    fn reports_without_service_data_never_match() {
        let filter = installed(vec![BleFilter { intent: Some(5), ..Default::default() }]);
        let (mut results, mut fp_results) = (Vec::new(), Vec::new());
        filter.match_ble(&report(&[0x02, 0x01, 0x06]), 0, &mut results, &mut fp_results);
        assert!(results.is_empty() && fp_results.is_empty());
    }
}

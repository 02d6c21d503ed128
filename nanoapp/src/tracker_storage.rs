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

//! Batched sightings of tracked devices.
//!
//! Every device, keyed like the advertising report cache, owns a short ring
//! of histories. A history is one Present episode, closed by an Absent entry
//! once the device has not been seen for `lost_timeout_ms`.

use std::collections::VecDeque;

use bluetooth::BleAdvertisingReport;
use log::{debug, error, info};

use crate::consts::ONE_MILLISECOND_IN_NANOSECONDS;
use crate::proto::{AdvReport, TrackerBatchConfig, TrackerHistory, TrackerReport, TrackerState};

#[derive(Debug)]
struct TrackerEntry {
    report: BleAdvertisingReport,
    histories: VecDeque<TrackerHistory>,
}

impl TrackerEntry {
    fn last_history(&self) -> Option<&TrackerHistory> {
        self.histories.back()
    }

    fn append(&mut self, history: TrackerHistory, max_history_count: usize) {
        while self.histories.len() >= max_history_count {
            self.histories.pop_front();
        }
        self.histories.push_back(history);
    }

    fn mark_absent(&mut self, now_ms: u64, max_history_count: usize) {
        if let Some(last) = self.last_history().copied() {
            self.append(
                TrackerHistory { lost_time_ms: now_ms, state: TrackerState::Absent, ..last },
                max_history_count,
            );
        }
    }

    fn is_lost(&self, now_ms: u64, lost_timeout_ms: u64) -> bool {
        self.last_history().is_some_and(|last| {
            last.state == TrackerState::Present
                && now_ms.saturating_sub(last.last_found_time_ms) >= lost_timeout_ms
        })
    }

    /// Takes the newest header fields of `report`, smoothing the RSSI.
    fn update_report(&mut self, report: &BleAdvertisingReport) {
        let rssi = match (self.report.rssi, report.rssi) {
            (Some(prev), Some(current)) => Some(smooth_rssi(prev, current)),
            (prev, current) => current.or(prev),
        };
        self.report.timestamp_ns = report.timestamp_ns;
        self.report.event_type_and_data_status = report.event_type_and_data_status;
        self.report.tx_power = report.tx_power;
        self.report.rssi = rssi;
    }
}

/// Exponential moving average giving the new sample a weight of 0.3.
fn smooth_rssi(prev: i8, current: i8) -> i8 {
    (0.3 * current as f32 + 0.7 * prev as f32).round() as i8
}

fn present(now_ms: u64) -> TrackerHistory {
    TrackerHistory {
        found_count: 1,
        first_found_time_ms: now_ms,
        last_found_time_ms: now_ms,
        lost_time_ms: 0,
        state: TrackerState::Present,
    }
}

#[derive(Debug, Default)]
pub struct TrackerStorage {
    entries: Vec<TrackerEntry>,
    // Latched once a full event was raised, until the storage is cleared.
    full_notified: bool,
    full_event_pending: bool,
}

impl TrackerStorage {
    pub fn new() -> Self {
        TrackerStorage::default()
    }

    /// Records a sighting at the report's timestamp. Returns false if the
    /// sighting was dropped.
    pub fn push(&mut self, report: &BleAdvertisingReport, config: &TrackerBatchConfig) -> bool {
        let now_ms = report.timestamp_ns / ONE_MILLISECOND_IN_NANOSECONDS;
        let max_history_count = (config.max_history_count as usize).max(1);

        let Some(entry) = self.entries.iter_mut().find(|entry| entry.report.same_key(report)) else {
            return self.insert(report, now_ms, config);
        };

        if entry.is_lost(now_ms, config.lost_timeout_ms as u64) {
            entry.mark_absent(now_ms, max_history_count);
        }
        match entry.histories.back_mut() {
            Some(last) if last.state == TrackerState::Present => {
                if now_ms.saturating_sub(last.last_found_time_ms) < config.sample_interval_ms as u64 {
                    return false;
                }
                last.found_count = last.found_count.saturating_add(1);
                last.last_found_time_ms = now_ms;
            }
            _ => entry.append(present(now_ms), max_history_count),
        }
        entry.update_report(report);
        true
    }

    fn insert(&mut self, report: &BleAdvertisingReport, now_ms: u64, config: &TrackerBatchConfig) -> bool {
        let max_tracker_count = config.max_tracker_count as usize;
        if self.entries.len() >= max_tracker_count {
            debug!("Tracker storage is full, dropping a new device");
            self.raise_full_event();
            return false;
        }
        if self.entries.try_reserve(1).is_err() {
            error!("Failed to grow tracker storage");
            self.raise_full_event();
            return false;
        }
        let mut histories = VecDeque::new();
        histories.push_back(present(now_ms));
        self.entries.push(TrackerEntry { report: report.clone(), histories });

        let threshold = config.notify_threshold_tracker_count as usize;
        if threshold > 0 && threshold < max_tracker_count && self.entries.len() >= threshold {
            self.raise_full_event();
        }
        true
    }

    fn raise_full_event(&mut self) {
        if !self.full_notified {
            info!("Tracker storage reached its capacity with {} devices", self.entries.len());
            self.full_notified = true;
            self.full_event_pending = true;
        }
    }

    /// Returns true once per storage-full edge.
    pub fn take_full_event(&mut self) -> bool {
        std::mem::take(&mut self.full_event_pending)
    }

    /// Closes the Present episode of every device unseen for
    /// `lost_timeout_ms`.
    pub fn refresh(&mut self, config: &TrackerBatchConfig, now_ms: u64) {
        let max_history_count = (config.max_history_count as usize).max(1);
        for entry in &mut self.entries {
            if entry.is_lost(now_ms, config.lost_timeout_ms as u64) {
                entry.mark_absent(now_ms, max_history_count);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.entries.shrink_to_fit();
        self.full_notified = false;
        self.full_event_pending = false;
    }

    pub fn get_batch_reports(&self) -> Vec<TrackerReport> {
        let mut reports = Vec::new();
        if reports.try_reserve(self.entries.len()).is_err() {
            error!("Failed to allocate {} tracker reports", self.entries.len());
            return reports;
        }
        reports.extend(self.entries.iter().map(|entry| TrackerReport {
            report: AdvReport::from(&entry.report),
            histories: entry.histories.iter().copied().collect(),
        }));
        reports
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluetooth::{BleAddress, BleAddressKind};
    use proptest::prelude::*;

    fn config() -> TrackerBatchConfig {
        TrackerBatchConfig {
            sample_interval_ms: 100,
            max_tracker_count: 4,
            notify_threshold_tracker_count: 0,
            max_history_count: 3,
            lost_timeout_ms: 1000,
            opportunistic_flush_threshold_ms: 0,
        }
    }

    fn sighting(addr: u64, time_ms: u64, rssi: i8) -> BleAdvertisingReport {
        BleAdvertisingReport::new(BleAddress::new(addr, BleAddressKind::Random), vec![0x02, 0x01, 0x06])
            .with_rssi(rssi)
            .with_timestamp_ns(time_ms * ONE_MILLISECOND_IN_NANOSECONDS)
    }

    #[test]
    fn sighting_sequence_builds_histories() {
        let config = config();
        let mut storage = TrackerStorage::new();
        assert!(storage.push(&sighting(1, 0, -40), &config));
        assert!(!storage.push(&sighting(1, 50, -60), &config));
        assert!(storage.push(&sighting(1, 200, -50), &config));
        storage.refresh(&config, 1100);
        storage.refresh(&config, 1200);
        assert!(storage.push(&sighting(1, 1500, -40), &config));
        assert!(storage.push(&sighting(1, 1600, -30), &config));

        let reports = storage.get_batch_reports();
        assert_eq!(reports.len(), 1);
        let histories = &reports[0].histories;
        assert_eq!(histories.len(), 3);
        assert_eq!(
            histories[0],
            TrackerHistory {
                found_count: 2,
                first_found_time_ms: 0,
                last_found_time_ms: 200,
                lost_time_ms: 0,
                state: TrackerState::Present,
            }
        );
        assert_eq!(histories[1].state, TrackerState::Absent);
        assert_eq!(histories[1].lost_time_ms, 1200);
        assert_eq!(histories[2].state, TrackerState::Present);
        assert_eq!(histories[2].first_found_time_ms, 1500);
        assert_eq!(histories[2].last_found_time_ms, 1600);
        // -40 -> -43 -> -42 -> -38
        assert_eq!(reports[0].report.rssi, Some(-38));
    }

    #[test]
    fn push_after_lost_timeout_closes_episode() {
        let config = config();
        let mut storage = TrackerStorage::new();
        storage.push(&sighting(1, 0, -40), &config);
        storage.push(&sighting(1, 5000, -40), &config);
        let histories = &storage.get_batch_reports()[0].histories;
        assert_eq!(histories.len(), 3);
        assert_eq!(histories[1].state, TrackerState::Absent);
        assert_eq!(histories[1].lost_time_ms, 5000);
        assert_eq!(histories[2].first_found_time_ms, 5000);
    }

    #[test]
    fn history_ring_is_bounded() {
        let config = TrackerBatchConfig { max_history_count: 2, ..config() };
        let mut storage = TrackerStorage::new();
        for time_ms in [0, 2000, 4000, 6000] {
            storage.push(&sighting(1, time_ms, -40), &config);
        }
        let histories = &storage.get_batch_reports()[0].histories;
        assert_eq!(histories.len(), 2);
        assert_eq!(histories[1].first_found_time_ms, 6000);
    }

    #[test]
    fn overflow_raises_one_full_event() {
        let config = TrackerBatchConfig { max_tracker_count: 2, ..config() };
        let mut storage = TrackerStorage::new();
        assert!(storage.push(&sighting(1, 0, -40), &config));
        assert!(storage.push(&sighting(2, 0, -40), &config));
        assert!(!storage.take_full_event());
        assert!(!storage.push(&sighting(3, 0, -40), &config));
        assert!(!storage.push(&sighting(4, 0, -40), &config));
        assert!(storage.take_full_event());
        assert!(!storage.take_full_event());
        assert_eq!(storage.len(), 2);

        storage.clear();
        assert!(storage.is_empty());
        storage.push(&sighting(1, 0, -40), &config);
        storage.push(&sighting(2, 0, -40), &config);
        storage.push(&sighting(3, 0, -40), &config);
        assert!(storage.take_full_event());
    }

    #[test]
    fn notify_threshold_raises_full_event_early() {
        let config = TrackerBatchConfig { notify_threshold_tracker_count: 2, ..config() };
        let mut storage = TrackerStorage::new();
        storage.push(&sighting(1, 0, -40), &config);
        assert!(!storage.take_full_event());
        storage.push(&sighting(2, 0, -40), &config);
        assert!(storage.take_full_event());
        assert!(storage.push(&sighting(3, 0, -40), &config));
        assert!(!storage.take_full_event());
    }

    proptest! {
        #[test]
        fn states_alternate_with_timestamped_transitions(
            gaps in proptest::collection::vec(0u64..3000, 1..40),
            refreshes in proptest::collection::vec(any::<bool>(), 40),
        ) {
            let config = TrackerBatchConfig { max_history_count: 100, ..config() };
            let mut storage = TrackerStorage::new();
            let mut now_ms = 0;
            for (gap, refresh) in gaps.iter().zip(&refreshes) {
                now_ms += gap;
                if *refresh {
                    storage.refresh(&config, now_ms);
                }
                storage.push(&sighting(1, now_ms, -40), &config);
            }
            let histories = &storage.get_batch_reports()[0].histories;
            prop_assert_eq!(histories[0].state, TrackerState::Present);
            for pair in histories.windows(2) {
                prop_assert_ne!(pair[0].state, pair[1].state);
                match pair[1].state {
                    TrackerState::Absent => prop_assert!(
                        pair[1].lost_time_ms - pair[1].last_found_time_ms >= config.lost_timeout_ms as u64
                    ),
                    TrackerState::Present => {
                        prop_assert!(pair[1].first_found_time_ms >= pair[0].lost_time_ms)
                    }
                }
            }
        }
    }
}

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

use serde::{Deserialize, Serialize};

use super::{ad_structures, BluetoothError};

/// Longest data pattern a controller generic filter can carry.
pub const BLE_DATA_LEN_MAX: usize = 29;

/// A hardware scan filter: matches advertisements holding an AD structure of
/// `ad_type` whose leading value bytes equal `data` under `data_mask`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BleGenericFilter {
    ad_type: u8,
    len: u8,
    data: [u8; BLE_DATA_LEN_MAX],
    data_mask: [u8; BLE_DATA_LEN_MAX],
}

impl BleGenericFilter {
    /// Builds a filter. `data` and `data_mask` must have equal length of at
    /// most `BLE_DATA_LEN_MAX` bytes.
    pub fn new(
        ad_type: u8,
        data: &[u8],
        data_mask: &[u8],
    ) -> Result<Self, BluetoothError> {
        if data.len() != data_mask.len() {
            return Err(BluetoothError::InvalidFilter(format!(
                "data length {} does not match mask length {}",
                data.len(),
                data_mask.len()
            )));
        }
        if data.len() > BLE_DATA_LEN_MAX {
            return Err(BluetoothError::InvalidFilter(format!(
                "pattern of {} bytes exceeds {} bytes",
                data.len(),
                BLE_DATA_LEN_MAX
            )));
        }
        let mut filter = BleGenericFilter {
            ad_type,
            len: data.len() as u8,
            data: [0; BLE_DATA_LEN_MAX],
            data_mask: [0; BLE_DATA_LEN_MAX],
        };
        filter.data[..data.len()].copy_from_slice(data);
        filter.data_mask[..data_mask.len()].copy_from_slice(data_mask);
        Ok(filter)
    }

    pub fn ad_type(&self) -> u8 {
        self.ad_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.pattern_len()]
    }

    pub fn data_mask(&self) -> &[u8] {
        &self.data_mask[..self.pattern_len()]
    }

    /// Pattern length, clamped so that a filter received from a peer can
    /// never index past its buffers.
    fn pattern_len(&self) -> usize {
        (self.len as usize).min(BLE_DATA_LEN_MAX)
    }

    /// Returns true if an AD structure value matches this filter's masked
    /// pattern.
    pub fn matches_value(&self, value: &[u8]) -> bool {
        let len = self.pattern_len();
        if value.len() < len {
            return false;
        }
        self.data()
            .iter()
            .zip(self.data_mask())
            .zip(value)
            .all(|((data, mask), byte)| data & mask == byte & mask)
    }

    /// Returns true if any AD structure of `adv_data` has this filter's type
    /// and a matching value.
    pub fn matches(&self, adv_data: &[u8]) -> bool {
        ad_structures(adv_data)
            .any(|ad| ad.ad_type == self.ad_type && self.matches_value(ad.value))
    }
}

impl PartialEq for BleGenericFilter {
    // Bytes past the pattern length are padding and never compared.
    fn eq(&self, other: &Self) -> bool {
        self.ad_type == other.ad_type
            && self.len == other.len
            && self.data() == other.data()
            && self.data_mask() == other.data_mask()
    }
}

impl Eq for BleGenericFilter {}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_pair_filter() -> BleGenericFilter {
        BleGenericFilter::new(0x16, &[0x2C, 0xFE], &[0xFF, 0xFF]).unwrap()
    }

    #[test]
    fn new_rejects_bad_lengths() {
        assert!(matches!(
            BleGenericFilter::new(0x16, &[0x2C, 0xFE], &[0xFF]),
            Err(BluetoothError::InvalidFilter(_))
        ));
        assert!(matches!(
            BleGenericFilter::new(0x16, &[0; 30], &[0; 30]),
            Err(BluetoothError::InvalidFilter(_))
        ));
    }

    #[test]
    fn matches_service_uuid() {
        let filter = fast_pair_filter();
        assert!(filter.matches(&[0x02, 0x01, 0x06, 0x06, 0x16, 0x2C, 0xFE, 0x1F, 0xD7, 0xD0]));
        assert!(!filter.matches(&[0x06, 0x16, 0xF1, 0xFC, 0x1F, 0xD7, 0xD0]));
        // Same bytes under another AD type do not match.
        assert!(!filter.matches(&[0x03, 0x03, 0x2C, 0xFE]));
    }

    #[test]
    fn matches_under_mask() {
        let filter =
            BleGenericFilter::new(0xFF, &[0xE0, 0x00, 0x10], &[0xFF, 0xFF, 0xF0]).unwrap();
        assert!(filter.matches(&[0x05, 0xFF, 0xE0, 0x00, 0x1A, 0x77]));
        assert!(!filter.matches(&[0x05, 0xFF, 0xE0, 0x00, 0x2A, 0x77]));
        // Value shorter than the pattern.
        assert!(!filter.matches(&[0x03, 0xFF, 0xE0, 0x00]));
    }

    #[test]
    fn equality_ignores_padding() {
        let mut padded = fast_pair_filter();
        padded.data[5] = 0x42;
        assert_eq!(padded, fast_pair_filter());
        let other = BleGenericFilter::new(0x16, &[0xF1, 0xFC], &[0xFF, 0xFF]).unwrap();
        assert_ne!(other, fast_pair_filter());
    }
}

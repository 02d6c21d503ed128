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

use super::{BleAddress, BleScanRecord};

/// Holds data related to an incoming BLE advertising report: who sent it,
/// how strong it was, when it arrived on the coprocessor clock, and the raw
/// advertising data. The report owns its data buffer, so cloning a report is
/// a deep copy.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct BleAdvertisingReport {
    /// Monotonic timestamp in nanoseconds on the coprocessor clock.
    pub timestamp_ns: u64,
    /// Event type and data status bits as reported by the controller.
    pub event_type_and_data_status: u8,
    /// Address of the advertiser.
    pub address: BleAddress,
    /// Transmit power in dBm, if advertised.
    pub tx_power: Option<i8>,
    /// Received signal strength in dBm, if measured.
    pub rssi: Option<i8>,
    /// Raw advertising data (sequence of AD structures).
    pub data: Vec<u8>,
}

impl BleAdvertisingReport {
    /// Construct a report carrying `data` from `address`.
    pub fn new(address: BleAddress, data: Vec<u8>) -> Self {
        BleAdvertisingReport {
            address,
            data,
            ..Default::default()
        }
    }

    /// Builder-style setter for the RSSI.
    pub fn with_rssi(mut self, rssi: i8) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Builder-style setter for the transmit power.
    pub fn with_tx_power(mut self, tx_power: i8) -> Self {
        self.tx_power = Some(tx_power);
        self
    }

    /// Builder-style setter for the coprocessor timestamp.
    pub fn with_timestamp_ns(mut self, timestamp_ns: u64) -> Self {
        self.timestamp_ns = timestamp_ns;
        self
    }

    /// Returns true when `other` was sent by the same advertiser with the same
    /// advertising payload. Caches use this as their deduplication key.
    pub fn same_key(&self, other: &BleAdvertisingReport) -> bool {
        self.address == other.address && self.data == other.data
    }

    /// Parses the service data carried by this report. The returned record
    /// borrows from the report's data buffer.
    pub fn scan_record(&self) -> BleScanRecord<'_> {
        BleScanRecord::parse(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BleAddressKind;

    #[test]
    fn same_key_requires_address_kind_and_data() {
        let addr = BleAddress::new(0x010203040506, BleAddressKind::Random);
        let report = BleAdvertisingReport::new(addr, vec![0x02, 0x01, 0x06])
            .with_rssi(-40);

        let louder = report.clone().with_rssi(-20).with_timestamp_ns(5);
        assert!(report.same_key(&louder));

        let other_kind = BleAdvertisingReport::new(
            BleAddress::new(0x010203040506, BleAddressKind::Public),
            vec![0x02, 0x01, 0x06],
        );
        assert!(!report.same_key(&other_kind));

        let other_data = BleAdvertisingReport::new(addr, vec![0x02, 0x01, 0x04]);
        assert!(!report.same_key(&other_data));
    }
}

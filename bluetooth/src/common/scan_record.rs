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

use tracing::debug;

/// Enum denoting the assigned number of Bluetooth common data types. Used for
/// fetching specific data sections from a Bluetooth advertisement.
/// Bluetooth Assigned Numbers, Section 2.3
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BleDataTypeId {
    ServiceData16BitUuid = 0x16,
}

/// One AD structure: its type byte and the value bytes that follow it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AdStructure<'a> {
    pub ad_type: u8,
    pub value: &'a [u8],
}

/// Iterator over the AD structures of raw advertising data.
/// See: Bluetooth Core Specification, Vol 3, Part C, Section 11.
///
/// Each structure is one length byte (covering type and value), one type
/// byte, then `length - 1` value bytes. Iteration ends at a zero-length
/// terminator or at the first structure that would run past the buffer.
#[derive(Clone, Debug)]
pub struct AdStructures<'a> {
    data: &'a [u8],
    index: usize,
}

/// Walk the AD structures of `data`.
pub fn ad_structures(data: &[u8]) -> AdStructures<'_> {
    AdStructures { data, index: 0 }
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = AdStructure<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.data.get(self.index..)?;
        let (&ad_length, rest) = remaining.split_first()?;
        let ad_length = ad_length as usize;
        if ad_length == 0 {
            self.index = self.data.len();
            return None;
        }
        let Some(structure) = rest.get(..ad_length) else {
            debug!(
                index = self.index,
                ad_length, "AD structure overruns advertising data"
            );
            self.index = self.data.len();
            return None;
        };
        self.index += 1 + ad_length;
        let (&ad_type, value) = structure.split_first()?;
        Some(AdStructure { ad_type, value })
    }
}

/// Struct representing the Bluetooth Service Data common data type with a
/// 16-bit UUID. The payload borrows from the advertising data it was parsed
/// from.
/// Bluetooth Supplement to the Core Specification, Part A, Section 1.11.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ServiceData<'a> {
    uuid: u16,
    data: &'a [u8],
}

impl<'a> ServiceData<'a> {
    pub fn new(uuid: u16, data: &'a [u8]) -> Self {
        ServiceData { uuid, data }
    }

    pub fn uuid(&self) -> u16 {
        self.uuid
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

/// View over the service data sections of an advertisement, in the order
/// they appear on air.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct BleScanRecord<'a> {
    pub service_data: Vec<ServiceData<'a>>,
}

impl<'a> BleScanRecord<'a> {
    /// Minimum AD length of a service data section: type byte, a 16-bit UUID
    /// and one payload byte.
    const MIN_SERVICE_DATA_AD_LENGTH: usize = 4;

    /// Parses the 16-bit UUID service data sections of `data`. Malformed input
    /// yields the sections parsed before the malformed structure.
    pub fn parse(data: &'a [u8]) -> Self {
        let service_data = ad_structures(data)
            .filter(|ad| {
                ad.ad_type == BleDataTypeId::ServiceData16BitUuid as u8
                    && ad.value.len() + 1 >= Self::MIN_SERVICE_DATA_AD_LENGTH
            })
            .map(|ad| {
                let uuid = u16::from_le_bytes([ad.value[0], ad.value[1]]);
                ServiceData::new(uuid, &ad.value[2..])
            })
            .collect();
        BleScanRecord { service_data }
    }

    /// First service data section carrying `uuid`, if any.
    pub fn service_data_for(&self, uuid: u16) -> Option<&ServiceData<'a>> {
        self.service_data.iter().find(|sd| sd.uuid() == uuid)
    }
}

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

//! Decoder for encrypted Nearby Presence v1 advertisements.

use log::{debug, trace, warn};

use crate::consts::{EXTENDED_DATA_ELEMENT_TYPES, MAX_PRESENCE_ACTIONS};
use crate::crypto::Crypto;
use crate::proto::DataElement;

/// Header of a v1 data element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataElementHeaderV1 {
    pub length: usize,
    pub data_type: u64,
    pub header_length: usize,
}

impl DataElementHeaderV1 {
    pub const SALT_TYPE: u64 = 0;
    pub const PRIVATE_IDENTITY_TYPE: u64 = 1;
    pub const PROVISIONED_IDENTITY_TYPE: u64 = 4;
    pub const TX_POWER_TYPE: u64 = 5;
    pub const ACTION_TYPE: u64 = 6;
    pub const MODEL_ID_TYPE: u64 = 7;
    pub const CONNECTION_STATUS_TYPE: u64 = 10;
    pub const BATTERY_STATUS_TYPE: u64 = 11;

    pub const SALT_LENGTH: usize = 2;
    pub const IDENTITY_LENGTH: usize = 16;
    pub const TX_POWER_LENGTH: usize = 1;
    pub const ACTION_LENGTH: usize = 1;
    pub const MODEL_ID_LENGTH: usize = 3;
    pub const CONNECTION_STATUS_LENGTH: usize = 3;
    pub const BATTERY_STATUS_LENGTH: usize = 3;

    const TYPE_MAX_BYTE_LENGTH: usize = 8;
    const EXTEND_BIT: u8 = 0b1000_0000;
    const NON_EXTEND_BITS: u8 = 0b0111_1111;

    /// Decodes a header from the front of `data`.
    ///
    /// Single byte form `0b0LLL_TTTT`. Multi byte form `0b1LLL_LLLL`
    /// followed by type bytes carrying 7 bits each, the top bit flagging a
    /// continuation.
    pub fn decode(data: &[u8]) -> Option<Self> {
        let first = *data.first()?;
        if first & Self::EXTEND_BIT == 0 {
            return Some(DataElementHeaderV1 {
                length: ((first & 0b0111_0000) >> 4) as usize,
                data_type: (first & 0b0000_1111) as u64,
                header_length: 1,
            });
        }

        let length = (first & Self::NON_EXTEND_BITS) as usize;
        let mut data_type = 0u64;
        let mut i = 1;
        loop {
            if i > Self::TYPE_MAX_BYTE_LENGTH {
                debug!("Data element type exceeds {} bytes", Self::TYPE_MAX_BYTE_LENGTH);
                return None;
            }
            let byte = *data.get(i)?;
            data_type = (data_type << 7) | (byte & Self::NON_EXTEND_BITS) as u64;
            if byte & Self::EXTEND_BIT == 0 {
                break;
            }
            i += 1;
        }
        Some(DataElementHeaderV1 { length, data_type, header_length: i + 1 })
    }
}

/// Fields of a successfully decrypted and authenticated v1 advertisement.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PresenceDecoderV1 {
    pub salt: [u8; DataElementHeaderV1::SALT_LENGTH],
    pub identity: [u8; DataElementHeaderV1::IDENTITY_LENGTH],
    pub actions: Vec<u8>,
    pub tx_power: Option<Vec<u8>>,
    pub model_id: Option<Vec<u8>>,
    pub connection_status: Option<Vec<u8>>,
    pub battery_status: Option<Vec<u8>>,
    pub extended_des: Vec<DataElement>,
}

impl PresenceDecoderV1 {
    const HEADER_INDEX: usize = 0;
    const SALT_INDEX: usize = 2;
    const IDENTITY_INDEX: usize = 5;
    const IDENTITY_HEADER_LENGTH: usize = 2;
    const DATA_ELEMENT_INDEX: usize = 23;
    const MIC_LENGTH: usize = 16;
    const VERSION: u8 = 1;

    /// Decrypts `encoded` (service data after the Presence UUID) with the
    /// certificate `key` and checks the decrypted identity against
    /// `metadata_encryption_key_tag`. Returns None on any format, decryption
    /// or authentication failure.
    pub fn decode(
        encoded: &[u8],
        crypto: &dyn Crypto,
        key: &[u8],
        metadata_encryption_key_tag: &[u8],
    ) -> Option<Self> {
        if encoded.len() < Self::DATA_ELEMENT_INDEX + Self::MIC_LENGTH {
            debug!("Presence v1 advertisement of {} bytes is too short", encoded.len());
            return None;
        }
        if encoded[Self::HEADER_INDEX] >> 5 != Self::VERSION {
            debug!("Advertisement version is not v1");
            return None;
        }

        let mut decoder = PresenceDecoderV1::default();
        let salt_header = DataElementHeaderV1::decode(&encoded[Self::SALT_INDEX..])?;
        if salt_header.data_type != DataElementHeaderV1::SALT_TYPE
            || salt_header.length != DataElementHeaderV1::SALT_LENGTH
        {
            debug!("Advertisement has no valid salt");
            return None;
        }
        let salt_start = Self::SALT_INDEX + salt_header.header_length;
        decoder.salt.copy_from_slice(&encoded[salt_start..salt_start + DataElementHeaderV1::SALT_LENGTH]);

        let identity_header = DataElementHeaderV1::decode(&encoded[Self::IDENTITY_INDEX..])?;
        if !(DataElementHeaderV1::PRIVATE_IDENTITY_TYPE..=DataElementHeaderV1::PROVISIONED_IDENTITY_TYPE)
            .contains(&identity_header.data_type)
            || identity_header.length != DataElementHeaderV1::IDENTITY_LENGTH
            || identity_header.header_length != Self::IDENTITY_HEADER_LENGTH
        {
            debug!("Advertisement has no identity");
            return None;
        }

        let cipher_text_start = Self::IDENTITY_INDEX + Self::IDENTITY_HEADER_LENGTH;
        let cipher_text = &encoded[cipher_text_start..encoded.len() - Self::MIC_LENGTH];
        let plain_text = match crypto.decrypt(cipher_text, &decoder.salt, key) {
            Ok(plain_text) => plain_text,
            Err(e) => {
                warn!("Failed to decrypt data elements: {}", e);
                return None;
            }
        };
        let (identity, data_elements) = plain_text.split_at(DataElementHeaderV1::IDENTITY_LENGTH);
        if !crypto.verify(identity, key, metadata_encryption_key_tag) {
            debug!("Metadata encryption key tag not matched");
            return None;
        }
        decoder.identity.copy_from_slice(identity);
        trace!("Decrypted identity {:02x?}", decoder.identity);

        if !decoder.decode_data_elements(data_elements) {
            debug!("Advertisement has invalid data elements");
            return None;
        }
        Some(decoder)
    }

    fn decode_data_elements(&mut self, data: &[u8]) -> bool {
        let mut index = 0;
        while index < data.len() {
            let Some(header) = DataElementHeaderV1::decode(&data[index..]) else {
                return false;
            };
            let start = index + header.header_length;
            let Some(value) = data.get(start..start + header.length) else {
                debug!("Data element type {} overruns the advertisement", header.data_type);
                return false;
            };
            let expected_length = match header.data_type {
                DataElementHeaderV1::ACTION_TYPE => Some(DataElementHeaderV1::ACTION_LENGTH),
                DataElementHeaderV1::TX_POWER_TYPE => Some(DataElementHeaderV1::TX_POWER_LENGTH),
                DataElementHeaderV1::MODEL_ID_TYPE => Some(DataElementHeaderV1::MODEL_ID_LENGTH),
                DataElementHeaderV1::CONNECTION_STATUS_TYPE => {
                    Some(DataElementHeaderV1::CONNECTION_STATUS_LENGTH)
                }
                DataElementHeaderV1::BATTERY_STATUS_TYPE => {
                    Some(DataElementHeaderV1::BATTERY_STATUS_LENGTH)
                }
                _ => None,
            };
            if expected_length.is_some_and(|length| length != header.length) {
                debug!(
                    "Data element type {} has incorrect length {}",
                    header.data_type, header.length
                );
                return false;
            }
            match header.data_type {
                DataElementHeaderV1::ACTION_TYPE => {
                    if self.actions.len() < MAX_PRESENCE_ACTIONS {
                        self.actions.push(value[0]);
                    } else {
                        debug!("Ignoring action {} beyond {}", value[0], MAX_PRESENCE_ACTIONS);
                    }
                }
                DataElementHeaderV1::TX_POWER_TYPE => self.tx_power = Some(value.to_vec()),
                DataElementHeaderV1::MODEL_ID_TYPE => self.model_id = Some(value.to_vec()),
                DataElementHeaderV1::CONNECTION_STATUS_TYPE => {
                    self.connection_status = Some(value.to_vec())
                }
                DataElementHeaderV1::BATTERY_STATUS_TYPE => {
                    self.battery_status = Some(value.to_vec())
                }
                other if EXTENDED_DATA_ELEMENT_TYPES.contains(&other) => {
                    self.extended_des.push(DataElement::new(other as u32, value))
                }
                other => debug!("Skipping data element type {}", other),
            }
            index = start + header.length;
        }
        true
    }

    /// Every decoded data element except actions, in wire-independent order.
    pub fn data_elements(&self) -> Vec<DataElement> {
        let fixed = [
            (DataElement::TX_POWER, &self.tx_power),
            (DataElement::MODEL_ID, &self.model_id),
            (DataElement::CONNECTION_STATUS, &self.connection_status),
            (DataElement::BATTERY_STATUS, &self.battery_status),
        ];
        fixed
            .into_iter()
            .filter_map(|(key, value)| value.as_ref().map(|value| DataElement::new(key, value.clone())))
            .chain(self.extended_des.iter().cloned())
            .collect()
    }

    /// Transmit power in dBm, when advertised.
    pub fn tx_power_dbm(&self) -> Option<i8> {
        self.tx_power.as_ref().and_then(|value| value.first()).map(|&b| b as i8)
    }
}

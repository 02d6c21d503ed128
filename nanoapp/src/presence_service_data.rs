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

use log::debug;

/// Decoded Presence v0 service data.
///
/// Header byte `0bVVV_LLLL_R` (version, field count, reserved) followed by
/// `field count` fields. Each field starts with `0bLLLL_TTTT`; a type nibble
/// of `0b1111` means one more byte follows whose high nibble extends the
/// length and whose low nibble selects the type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PresenceServiceData<'a> {
    pub version: u8,
    pub first_intent: Option<u8>,
    pub second_intent: Option<u8>,
    pub fp_model_id: Option<&'a [u8]>,
    pub account_key_salt: Option<&'a [u8]>,
    pub account_key_filter: Option<&'a [u8]>,
    pub battery: Option<&'a [u8]>,
}

struct FieldHeader {
    length: usize,
    field_type: u8,
    header_length: usize,
}

impl FieldHeader {
    const EXTENDED_TYPE: u8 = 0b1111;

    fn decode(data: &[u8]) -> Option<Self> {
        let first = *data.first()?;
        let length = (first >> 4) as usize;
        let field_type = first & 0x0F;
        if field_type != Self::EXTENDED_TYPE {
            return Some(FieldHeader { length, field_type, header_length: 1 });
        }
        let extension = *data.get(1)?;
        Some(FieldHeader {
            length: length | ((extension & 0xF0) as usize),
            field_type: Self::EXTENDED_TYPE + (extension & 0x0F),
            header_length: 2,
        })
    }
}

impl<'a> PresenceServiceData<'a> {
    const INTENT_TYPE: u8 = 0b0110;
    const FP_MODEL_ID_TYPE: u8 = 0b0111;
    const ACCOUNT_KEY_DATA_TYPE: u8 = 0b1001;
    const BATTERY_TYPE: u8 = 0b1011;

    const FP_MODEL_ID_LENGTH: usize = 3;
    const ACCOUNT_KEY_SALT_LENGTH: usize = 2;
    const ACCOUNT_KEY_FILTER_LENGTH: usize = 9;
    const BATTERY_LENGTH: usize = 3;

    /// Parses Presence v0 service data. Returns None when a field overruns the
    /// payload or the declared fields do not end exactly at the payload end.
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        let (&header, _) = data.split_first()?;
        let mut service_data = PresenceServiceData {
            version: header >> 5,
            ..Default::default()
        };
        let num_fields = (header >> 1) & 0x0F;

        let mut index = 1;
        for _ in 0..num_fields {
            let field_header = FieldHeader::decode(data.get(index..)?)?;
            let start = index + field_header.header_length;
            let value = data.get(start..start + field_header.length)?;
            service_data.apply_field(field_header.field_type, value);
            index = start + field_header.length;
        }
        if index != data.len() {
            debug!(
                "Presence fields end at {} of {} bytes of service data",
                index,
                data.len()
            );
            return None;
        }
        Some(service_data)
    }

    fn apply_field(&mut self, field_type: u8, value: &'a [u8]) {
        match (field_type, value.len()) {
            (Self::INTENT_TYPE, 1..=2) => {
                self.first_intent = value.first().copied();
                self.second_intent = value.get(1).copied();
            }
            (Self::FP_MODEL_ID_TYPE, Self::FP_MODEL_ID_LENGTH) => self.fp_model_id = Some(value),
            (Self::ACCOUNT_KEY_DATA_TYPE, len)
                if len == Self::ACCOUNT_KEY_SALT_LENGTH + Self::ACCOUNT_KEY_FILTER_LENGTH =>
            {
                let (salt, filter) = value.split_at(Self::ACCOUNT_KEY_SALT_LENGTH);
                self.account_key_salt = Some(salt);
                self.account_key_filter = Some(filter);
            }
            (Self::BATTERY_TYPE, Self::BATTERY_LENGTH) => self.battery = Some(value),
            (field_type, len) => {
                debug!("Ignoring Presence field type {field_type} of length {len}")
            }
        }
    }
}

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

/// Fields of a Fast Pair "not discoverable" advertisement payload.
/// https://developers.google.com/nearby/fast-pair/specifications/service/provider#advertising_payload_fast_pair_account_data
///
/// Slices borrow from the service data they were parsed from. `battery` and
/// `rrd` keep their element header byte, since that byte takes part in the
/// account key filter lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FastPairAccountData<'a> {
    pub version: u8,
    pub filter: &'a [u8],
    pub salt: &'a [u8],
    pub battery: Option<&'a [u8]>,
    pub rrd: Option<&'a [u8]>,
}

impl<'a> FastPairAccountData<'a> {
    const FILTER_SHOW_UI_TYPE: u8 = 0b0000;
    const SALT_TYPE: u8 = 0b0001;
    const FILTER_HIDE_UI_TYPE: u8 = 0b0010;
    const BATTERY_SHOW_UI_TYPE: u8 = 0b0011;
    const BATTERY_HIDE_UI_TYPE: u8 = 0b0100;
    const RRD_TYPE: u8 = 0b0110;

    /// Parses `service_data`, the payload following the Fast Pair UUID.
    /// Returns None unless both an account key filter and a salt are present
    /// and every element fits inside the payload.
    pub fn parse(service_data: &'a [u8]) -> Option<Self> {
        let (&header, mut rest) = service_data.split_first()?;
        let version = header >> 4;
        let mut filter = None;
        let mut salt = None;
        let mut battery = None;
        let mut rrd = None;

        while let Some(&element_header) = rest.first() {
            let length = (element_header >> 4) as usize;
            let element_type = element_header & 0x0F;
            let Some(element) = rest.get(..1 + length) else {
                debug!("Fast Pair element of length {length} overruns account data");
                return None;
            };
            let value = &element[1..];
            match element_type {
                Self::FILTER_SHOW_UI_TYPE | Self::FILTER_HIDE_UI_TYPE => filter = Some(value),
                Self::SALT_TYPE => salt = Some(value),
                Self::BATTERY_SHOW_UI_TYPE | Self::BATTERY_HIDE_UI_TYPE => battery = Some(element),
                Self::RRD_TYPE => rrd = Some(element),
                other => debug!("Skipping Fast Pair element type {other}"),
            }
            rest = &rest[1 + length..];
        }

        Some(FastPairAccountData {
            version,
            filter: filter?,
            salt: salt?,
            battery,
            rrd,
        })
    }
}

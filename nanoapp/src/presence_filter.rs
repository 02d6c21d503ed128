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

use bluetooth::BleScanRecord;
use log::debug;

use crate::consts::{AUTHENTICITY_KEY_LENGTH, METADATA_ENCRYPTION_KEY_TAG_LENGTH, PRESENCE_UUID};
use crate::crypto::Crypto;
use crate::fast_pair_filter::{has_initial_pair_filter, set_initial_pair_result};
use crate::filter::service_data_bytes;
use crate::presence_decoder_v1::PresenceDecoderV1;
use crate::presence_service_data::PresenceServiceData;
use crate::proto::{BleFilter, BleFilterResult, DataElement, ResultType};

/// Matches a plain-text Presence v0 advertisement by intent. A v0 frame that
/// carries a Fast Pair model id also satisfies an initial pair filter.
pub fn match_presence_v0(
    filter: &BleFilter,
    scan_record: &BleScanRecord,
    result: &mut BleFilterResult,
) -> bool {
    let Some(service_data) = scan_record.service_data_for(PRESENCE_UUID) else {
        return false;
    };
    result.ble_service_data = service_data_bytes(service_data);
    let Some(presence) = PresenceServiceData::parse(service_data.data()) else {
        debug!("Presence service data is not a v0 frame");
        return false;
    };

    if presence.fp_model_id.is_some() && has_initial_pair_filter(filter) {
        debug!("Matched Fast Pair initial pair in Presence v0");
        set_initial_pair_result(result);
        return true;
    }
    let Some(intent) = filter.intent else {
        return false;
    };
    let matched = [presence.first_intent, presence.second_intent]
        .into_iter()
        .flatten()
        .any(|advertised| advertised as u32 == intent);
    if matched {
        result.intent = Some(intent);
        result.result_type = ResultType::Presence;
    }
    matched
}

/// Matches an encrypted Presence v1 advertisement: one certificate of
/// `filter` must decrypt and authenticate it, the filter intent must be among
/// its actions and every filter data element must be advertised verbatim.
pub fn match_presence_v1(
    filter: &BleFilter,
    scan_record: &BleScanRecord,
    crypto: &dyn Crypto,
    result: &mut BleFilterResult,
) -> bool {
    let mut decoded = None;
    for service_data in scan_record.service_data.iter().filter(|sd| sd.uuid() == PRESENCE_UUID) {
        let certificates = filter.certificates.iter().filter(|certificate| {
            certificate.authenticity_key.len() == AUTHENTICITY_KEY_LENGTH
                && certificate.metadata_encryption_key_tag.len() == METADATA_ENCRYPTION_KEY_TAG_LENGTH
        });
        for certificate in certificates {
            if let Some(decoder) = PresenceDecoderV1::decode(
                service_data.data(),
                crypto,
                &certificate.authenticity_key,
                &certificate.metadata_encryption_key_tag,
            ) {
                debug!("Decoded Presence v1 advertisement");
                result.public_credential = Some(certificate.clone());
                result.ble_service_data = service_data_bytes(service_data);
                decoded = Some(decoder);
                break;
            }
        }
        if decoded.is_some() {
            break;
        }
    }
    let Some(decoder) = decoded else {
        return false;
    };

    if let Some(intent) = filter.intent {
        if !decoder.actions.iter().any(|&action| action as u32 == intent) {
            debug!("Presence v1 actions {:?} do not include {}", decoder.actions, intent);
            return false;
        }
        result.intent = Some(intent);
    }

    let data_elements = decoder.data_elements();
    let all_matched = filter.data_elements.iter().all(|wanted| {
        data_elements.iter().any(|de: &DataElement| de == wanted)
    });
    if !all_matched {
        debug!("Presence v1 data elements do not satisfy the filter");
        return false;
    }
    if let Some(tx_power) = decoder.tx_power_dbm() {
        result.tx_power = Some(tx_power);
    }
    result.data_elements.extend(data_elements);
    result.result_type = ResultType::Presence;
    true
}

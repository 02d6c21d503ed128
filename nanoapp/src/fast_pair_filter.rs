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

use crate::bloom_filter::BloomFilter;
use crate::consts::{FAST_PAIR_UUID, FP_ACCOUNT_KEY_LENGTH};
use crate::fast_pair_account_data::FastPairAccountData;
use crate::filter::service_data_bytes;
use crate::proto::{BleFilter, BleFilterResult, DataElement, ResultType};

/// First account key bytes tried when the advertised account key filter
/// misses and the provider includes RRD: default, recently used and in use.
const RRD_ACCOUNT_KEY_PREFIXES: [u8; 3] = [0x04, 0x05, 0x06];

fn account_keys(filter: &BleFilter) -> impl Iterator<Item = &[u8]> {
    filter
        .data_elements
        .iter()
        .filter(|de| {
            de.key == DataElement::FAST_PAIR_ACCOUNT_KEY && de.value.len() == FP_ACCOUNT_KEY_LENGTH
        })
        .map(|de| de.value.as_slice())
}

/// Returns true if `filter` asks for initial pair advertisements, expressed as
/// an all-zero account key.
pub fn has_initial_pair_filter(filter: &BleFilter) -> bool {
    account_keys(filter).any(|key| key.iter().all(|&b| b == 0))
}

/// Marks `result` as an initial pair Fast Pair result.
pub fn set_initial_pair_result(result: &mut BleFilterResult) {
    result.data_elements.push(DataElement::new(
        DataElement::FAST_PAIR_ACCOUNT_KEY,
        vec![0u8; FP_ACCOUNT_KEY_LENGTH],
    ));
    result.result_type = ResultType::FastPair;
}

/// Matches a discoverable Fast Pair advertisement, whose service data is the
/// bare 3-byte model id.
pub fn match_initial_pair(
    filter: &BleFilter,
    scan_record: &BleScanRecord,
    result: &mut BleFilterResult,
) -> bool {
    if !has_initial_pair_filter(filter) {
        return false;
    }
    let Some(service_data) = scan_record
        .service_data
        .iter()
        .find(|sd| sd.uuid() == FAST_PAIR_UUID && sd.data().len() == 3)
    else {
        return false;
    };
    debug!("Matched Fast Pair initial pair advertisement");
    result.ble_service_data = service_data_bytes(service_data);
    set_initial_pair_result(result);
    true
}

/// Matches a not-discoverable Fast Pair advertisement against every account
/// key of `filter`.
pub fn match_subsequent_pair(
    filter: &BleFilter,
    scan_record: &BleScanRecord,
    result: &mut BleFilterResult,
) -> bool {
    for service_data in scan_record.service_data.iter().filter(|sd| sd.uuid() == FAST_PAIR_UUID) {
        let Some(account_data) = FastPairAccountData::parse(service_data.data()) else {
            continue;
        };
        let bloom_filter = BloomFilter::new(account_data.filter);
        for account_key in account_keys(filter).filter(|key| key.iter().any(|&b| b != 0)) {
            if matches_account_key(&bloom_filter, account_key, &account_data) {
                debug!("Matched Fast Pair subsequent pair advertisement");
                result.ble_service_data = service_data_bytes(service_data);
                result.data_elements.push(DataElement::new(
                    DataElement::FAST_PAIR_ACCOUNT_KEY,
                    account_key,
                ));
                result.result_type = ResultType::FastPair;
                return true;
            }
        }
    }
    false
}

/// Tests `account_key || salt || battery || rrd` against the advertised
/// account key filter. RRD only takes part from version 1 on.
fn matches_account_key(
    bloom_filter: &BloomFilter,
    account_key: &[u8],
    account_data: &FastPairAccountData,
) -> bool {
    let mut key = Vec::with_capacity(FP_ACCOUNT_KEY_LENGTH + 16);
    key.extend_from_slice(account_key);
    key.extend_from_slice(account_data.salt);
    if let Some(battery) = account_data.battery {
        key.extend_from_slice(battery);
    }
    let rrd = account_data.rrd.filter(|_| account_data.version >= 1);
    if let Some(rrd) = rrd {
        key.extend_from_slice(rrd);
    }
    if bloom_filter.may_contain(&key) {
        return true;
    }
    if rrd.is_none() {
        return false;
    }
    RRD_ACCOUNT_KEY_PREFIXES.iter().any(|&prefix| {
        key[0] = prefix;
        bloom_filter.may_contain(&key)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT_KEY: [u8; 16] = [
        0x04, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01, 0x25, 0x9F,
    ];

    fn filter_with_key(key: &[u8]) -> BleFilter {
        BleFilter {
            data_elements: vec![DataElement::new(DataElement::FAST_PAIR_ACCOUNT_KEY, key)],
            ..Default::default()
        }
    }

    #[test]
    fn initial_pair_matches_model_id() {
        let data = [0x06, 0x16, 0x2C, 0xFE, 0x1F, 0xD7, 0xD0];
        let mut result = BleFilterResult::default();
        assert!(match_initial_pair(&filter_with_key(&[0; 16]), &BleScanRecord::parse(&data), &mut result));
        assert_eq!(result.result_type, ResultType::FastPair);
        assert_eq!(result.ble_service_data, vec![0x05, 0x2C, 0xFE, 0x1F, 0xD7, 0xD0]);
        assert_eq!(result.data_elements[0].value, vec![0; 16]);

        let mut result = BleFilterResult::default();
        assert!(!match_initial_pair(&filter_with_key(&ACCOUNT_KEY), &BleScanRecord::parse(&data), &mut result));
    }

    #[test]
    fn subsequent_pair_matches_account_key() {
        let data = [0x0C, 0x16, 0x2C, 0xFE, 0x00, 0x40, 0x02, 0x0C, 0x80, 0x2A, 0x21, 0xC7, 0xC8];
        let mut result = BleFilterResult::default();
        assert!(match_subsequent_pair(&filter_with_key(&ACCOUNT_KEY), &BleScanRecord::parse(&data), &mut result));
        assert_eq!(result.data_elements, vec![DataElement::new(DataElement::FAST_PAIR_ACCOUNT_KEY, ACCOUNT_KEY)]);

        let mut other_key = ACCOUNT_KEY;
        other_key[15] = 0x00;
        let mut result = BleFilterResult::default();
        assert!(!match_subsequent_pair(&filter_with_key(&other_key), &BleScanRecord::parse(&data), &mut result));
    }

    fn account_data_with_rrd(filter_bytes: &[u8]) -> Vec<u8> {
        let mut service_data = vec![0x10, (filter_bytes.len() as u8) << 4];
        service_data.extend_from_slice(filter_bytes);
        service_data.extend_from_slice(&[0x21, 0xC7, 0xC8, 0x16, 0x00]);
        service_data
    }

    #[test]
    fn subsequent_pair_tries_rrd_prefixes() {
        // The provider built its filter with the in-use prefix 0x05.
        let mut bloom_filter = BloomFilter::new(&[0; 9]);
        let mut provider_key = ACCOUNT_KEY.to_vec();
        provider_key[0] = 0x05;
        provider_key.extend_from_slice(&[0xC7, 0xC8, 0x16, 0x00]);
        bloom_filter.add(&provider_key);

        let service_data = account_data_with_rrd(bloom_filter.as_bytes());
        let account_data = FastPairAccountData::parse(&service_data).unwrap();
        assert!(matches_account_key(&bloom_filter, &ACCOUNT_KEY, &account_data));

        let without_rrd = FastPairAccountData { rrd: None, ..account_data };
        assert!(!matches_account_key(&bloom_filter, &ACCOUNT_KEY, &without_rrd));
    }
}

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

//! Compile-time defaults shared across the nanoapp.

pub const ONE_MILLISECOND_IN_NANOSECONDS: u64 = 1_000_000;
pub const ONE_SECOND_IN_NANOSECONDS: u64 = 1_000_000_000;

/// Fast Pair service UUID.
pub const FAST_PAIR_UUID: u16 = 0xFE2C;
/// Nearby Presence service UUID.
pub const PRESENCE_UUID: u16 = 0xFCF1;

/// Advertising report caches refresh once they hold more entries than this.
pub const ADV_REPORT_CACHE_REFRESH_THRESHOLD: usize = 8;
/// Expiry that keeps cache entries until they are explicitly cleared.
pub const ADV_REPORT_CACHE_NO_EXPIRY_NS: u64 = u64::MAX;

/// Send buffer for filter results, extension results and config responses.
pub const FILTER_RESULTS_BUF_SIZE: usize = 400;
/// Send buffer for a single tracker report.
pub const TRACKER_REPORTS_BUF_SIZE: usize = 800;
/// Per-result framing overhead assumed when estimating a bulk message size.
pub const FILTER_RESULT_HEADER_SIZE: usize = 2;
/// Size of the ACK sent for a filter update.
pub const FILTER_ACK_SIZE: usize = 3;

/// Report delay used for batched scans unless a filter asks for less.
pub const BATCH_SCAN_REPORT_DELAY_LOW_POWER_MS: u32 = 3000;
/// Period of the BLE scan keep-alive timer.
pub const BLE_SCAN_KEEP_ALIVE_INTERVAL_NS: u64 = 60 * ONE_SECOND_IN_NANOSECONDS;

/// How long Fast Pair results stay deliverable on the next screen-on.
pub const FP_FILTER_CACHE_EXPIRE_NS: u64 = 3 * ONE_SECOND_IN_NANOSECONDS;

/// Fast Pair account key length.
pub const FP_ACCOUNT_KEY_LENGTH: usize = 16;
/// Presence v1 certificate authenticity key length.
pub const AUTHENTICITY_KEY_LENGTH: usize = 32;
/// Presence v1 certificate metadata encryption key tag length.
pub const METADATA_ENCRYPTION_KEY_TAG_LENGTH: usize = 32;

/// Upper bound on actions decoded from one Presence v1 advertisement.
pub const MAX_PRESENCE_ACTIONS: usize = 5;
/// Data element types collected verbatim from Presence v1 advertisements.
pub const EXTENDED_DATA_ELEMENT_TYPES: std::ops::RangeInclusive<u64> = 12..=255;

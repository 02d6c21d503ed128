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

//! Messages exchanged with the host and their postcard codec.

use bluetooth::{BleAdvertisingReport, BleGenericFilter};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::nearby_extension::ExtResult;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("postcard codec error: {0}")]
    Postcard(#[from] postcard::Error),
    /// The encoded message does not fit the send buffer of the given size.
    #[error("encoded message does not fit in {0} bytes")]
    BufferOverflow(usize),
}

/// Numeric message types carried next to each host message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum FilterMessageType {
    Unknown = 0,
    Filters = 1,
    FilterResults = 2,
    Success = 3,
    Failure = 4,
    Config = 5,
    ExtConfigRequest = 6,
    ExtConfigResponse = 7,
    TrackerReport = 8,
    ExtStorageFullEvent = 9,
}

impl From<u32> for FilterMessageType {
    fn from(value: u32) -> Self {
        match value {
            1 => FilterMessageType::Filters,
            2 => FilterMessageType::FilterResults,
            3 => FilterMessageType::Success,
            4 => FilterMessageType::Failure,
            5 => FilterMessageType::Config,
            6 => FilterMessageType::ExtConfigRequest,
            7 => FilterMessageType::ExtConfigResponse,
            8 => FilterMessageType::TrackerReport,
            9 => FilterMessageType::ExtStorageFullEvent,
            _ => FilterMessageType::Unknown,
        }
    }
}

/// A `(key, value)` pair. Filters use it as an exact-match predicate, results
/// use it to carry decoded advertisement fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataElement {
    pub key: u32,
    pub value: Vec<u8>,
}

impl DataElement {
    pub const SALT: u32 = 0;
    pub const PRIVATE_IDENTITY: u32 = 1;
    pub const TRUSTED_IDENTITY: u32 = 2;
    pub const PUBLIC_IDENTITY: u32 = 3;
    pub const PROVISIONED_IDENTITY: u32 = 4;
    pub const TX_POWER: u32 = 5;
    pub const ACTION: u32 = 6;
    pub const MODEL_ID: u32 = 7;
    pub const FAST_PAIR_ACCOUNT_KEY: u32 = 9;
    pub const CONNECTION_STATUS: u32 = 10;
    pub const BATTERY_STATUS: u32 = 11;

    pub fn new(key: u32, value: impl Into<Vec<u8>>) -> Self {
        DataElement { key, value: value.into() }
    }
}

/// Presence v1 certificate: the keys that decrypt and authenticate one
/// device's advertisements.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicCredential {
    pub authenticity_key: Vec<u8>,
    pub metadata_encryption_key_tag: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleFilter {
    pub id: u32,
    pub latency_ms: Option<u32>,
    pub intent: Option<u32>,
    pub data_elements: Vec<DataElement>,
    pub certificates: Vec<PublicCredential>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleFilters {
    pub filters: Vec<BleFilter>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultType {
    #[default]
    Unknown,
    Presence,
    FastPair,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleFilterResult {
    pub id: u32,
    pub tx_power: Option<i8>,
    pub rssi: Option<i8>,
    pub intent: Option<u32>,
    pub bluetooth_address: [u8; 6],
    pub public_credential: Option<PublicCredential>,
    pub data_elements: Vec<DataElement>,
    /// Length-prefixed service data: `[len(uuid + data)] ++ uuid_le ++ data`.
    pub ble_service_data: Vec<u8>,
    pub result_type: ResultType,
    /// Report time translated to the host clock.
    pub timestamp_ns: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleFilterResults {
    pub results: Vec<BleFilterResult>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleConfig {
    pub screen_on: Option<bool>,
    pub fast_pair_cache_expire_time_sec: Option<u32>,
}

/// An advertising report as delivered to extension and tracker clients.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvReport {
    pub timestamp_ns: u64,
    pub event_type_and_data_status: u8,
    pub address: [u8; 6],
    pub address_type: u8,
    pub tx_power: Option<i8>,
    pub rssi: Option<i8>,
    pub data: Vec<u8>,
}

impl From<&BleAdvertisingReport> for AdvReport {
    fn from(report: &BleAdvertisingReport) -> Self {
        AdvReport {
            timestamp_ns: report.timestamp_ns,
            event_type_and_data_status: report.event_type_and_data_status,
            address: *report.address.bytes(),
            address_type: report.address.get_kind() as u8,
            tx_power: report.tx_power,
            rssi: report.rssi,
            data: report.data.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtFilterConfig {
    pub hardware_filters: Vec<BleGenericFilter>,
    /// Opaque payload interpreted by the OEM extension.
    pub oem_filter: Vec<u8>,
    /// How long deliver-on-wake reports stay cached.
    pub cache_expire_ms: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtServiceConfig {
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerBatchConfig {
    pub sample_interval_ms: u32,
    pub max_tracker_count: u32,
    pub notify_threshold_tracker_count: u32,
    pub max_history_count: u32,
    pub lost_timeout_ms: u32,
    pub opportunistic_flush_threshold_ms: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerFilterConfig {
    pub hardware_filters: Vec<BleGenericFilter>,
    /// None accepts any RSSI.
    pub rssi_threshold: Option<i8>,
    pub active_interval_ms: u32,
    pub active_window_ms: u32,
    pub batch_config: TrackerBatchConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtConfig {
    FilterConfig(ExtFilterConfig),
    ServiceConfig(ExtServiceConfig),
    TrackerFilterConfig(TrackerFilterConfig),
    FlushTrackerReports,
}

impl ExtConfig {
    pub fn name(&self) -> &'static str {
        match self {
            ExtConfig::FilterConfig(_) => "FilterConfig",
            ExtConfig::ServiceConfig(_) => "ServiceConfig",
            ExtConfig::TrackerFilterConfig(_) => "TrackerFilterConfig",
            ExtConfig::FlushTrackerReports => "FlushTrackerReports",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtConfigRequest {
    pub request_id: u32,
    /// None when the host set no config variant.
    pub config: Option<ExtConfig>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtConfigResponse {
    pub request_id: u32,
    pub result: ExtResult,
    pub vendor_status: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerState {
    #[default]
    Present,
    Absent,
}

/// One Present or Absent episode of a tracked device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerHistory {
    pub found_count: u32,
    pub first_found_time_ms: u64,
    pub last_found_time_ms: u64,
    pub lost_time_ms: u64,
    pub state: TrackerState,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerReport {
    pub report: AdvReport,
    pub histories: Vec<TrackerHistory>,
}

/// Encodes `message` into at most `buf_size` bytes.
pub fn encode<T: Serialize>(message: &T, buf_size: usize) -> Result<Vec<u8>, CodecError> {
    let mut buf = vec![0u8; buf_size];
    let used = match postcard::to_slice(message, &mut buf) {
        Ok(used) => used.len(),
        Err(postcard::Error::SerializeBufferFull) => {
            return Err(CodecError::BufferOverflow(buf_size))
        }
        Err(e) => return Err(e.into()),
    };
    buf.truncate(used);
    Ok(buf)
}

/// Size of `message` once encoded, without a buffer bound.
pub fn encoded_size<T: Serialize>(message: &T) -> Result<usize, CodecError> {
    Ok(postcard::to_allocvec(message)?.len())
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(postcard::from_bytes(bytes)?)
}

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

//! Entry points of the vendor extension library that makes per-packet
//! decisions for extension filters.

use bluetooth::{BleAdvertisingReport, BleGenericFilter};
use serde::{Deserialize, Serialize};

use crate::platform::HostEndpointInfo;

/// Result codes reported back to the host in an `ExtConfigResponse`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ExtResult {
    #[default]
    Ok = 0,
    FeatureNotSupported = 1,
    InternalError = 2,
    UnknownPackage = 3,
    OutOfResources = 4,
    VendorSpecificError = 5,
}

impl ExtResult {
    pub fn is_ok(&self) -> bool {
        *self == ExtResult::Ok
    }
}

/// Outcome of a configuration call; `vendor_status` carries vendor detail.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtStatus {
    pub result: ExtResult,
    pub vendor_status: u32,
}

impl ExtStatus {
    pub fn new(result: ExtResult, vendor_status: u32) -> Self {
        ExtStatus { result, vendor_status }
    }
}

/// Where an extension wants a report to go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtMatch {
    Ignore,
    DeliverOnWake,
    DeliverImmediately,
}

pub trait NearbyExtension {
    /// Installs the hardware filters and opaque filter payload of `host`.
    fn set_filter_config(
        &mut self,
        _host: &HostEndpointInfo,
        _hardware_filters: &[BleGenericFilter],
        _config: &[u8],
    ) -> ExtStatus {
        ExtStatus::new(ExtResult::FeatureNotSupported, 0)
    }

    /// Installs the opaque service payload of `host`.
    fn set_service_config(&mut self, _host: &HostEndpointInfo, _config: &[u8]) -> ExtStatus {
        ExtStatus::new(ExtResult::FeatureNotSupported, 0)
    }

    fn match_report(&mut self, _host: &HostEndpointInfo, _report: &BleAdvertisingReport) -> ExtMatch {
        ExtMatch::Ignore
    }
}

/// Used when no vendor library is linked.
#[derive(Debug, Default)]
pub struct UnsupportedExtension;

impl NearbyExtension for UnsupportedExtension {}

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

mod address;
mod advertisement;
mod error;
mod generic_filter;
mod scan_record;

pub use address::{BleAddress, BleAddressKind};
pub use advertisement::BleAdvertisingReport;
pub use error::BluetoothError;
pub use generic_filter::{BleGenericFilter, BLE_DATA_LEN_MAX};
pub use scan_record::{
    ad_structures, AdStructure, AdStructures, BleDataTypeId, BleScanRecord,
    ServiceData,
};

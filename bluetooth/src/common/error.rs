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

use thiserror::Error;

/// Library error type.
#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Clone)]
pub enum BluetoothError {
    /// Reported when the user attempts a bad type conversion, e.g. converting
    /// an unknown controller address type into a `BleAddressKind`.
    #[error("bad type conversion: {0}")]
    BadTypeConversion(String),
    /// Reported when a hardware scan filter cannot be represented by the
    /// controller, e.g. its pattern is longer than the controller supports or
    /// the data and mask lengths disagree.
    #[error("invalid scan filter: {0}")]
    InvalidFilter(String),
}

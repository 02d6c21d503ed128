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

//! Nearby BLE filter nanoapp: matches advertisements against Presence, Fast
//! Pair, tracker and vendor extension filters and reports hits to the host.

pub mod adv_report_cache;
pub mod app_manager;
pub mod ble_scan_provider;
pub mod ble_scanner;
pub mod ble_scanner_emulator;
mod bloom_filter;
pub mod client_emulator;
pub mod client_provider;
pub mod consts;
pub mod crypto;
pub mod engine;
mod fast_pair_account_data;
mod fast_pair_filter;
pub mod filter;
pub mod filter_extension;
pub mod nearby_extension;
pub mod platform;
mod presence_decoder_v1;
mod presence_filter;
mod presence_service_data;
pub mod proto;
pub mod provider;
pub mod timer;
mod timer_provider;
pub mod tracker_filter;
pub mod tracker_storage;

pub use app_manager::{AppManager, Event};
pub use crypto::CryptoError;
pub use engine::{EngineConfig, NearbyEngine};
pub use nearby_extension::{ExtMatch, ExtResult, ExtStatus, NearbyExtension, UnsupportedExtension};
pub use proto::{CodecError, FilterMessageType};

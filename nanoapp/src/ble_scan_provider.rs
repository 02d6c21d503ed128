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

use bluetooth::BleAdvertisingReport;
use tokio::sync::mpsc;

use crate::app_manager::Event;
use crate::platform::AsyncResult;
use crate::provider::{update_engine, ProviderEvent};

/// Handle the BLE driver uses to deliver scan output to the engine.
#[derive(Clone, Debug)]
pub struct BleScanCallback {
    provider_event_tx: mpsc::Sender<ProviderEvent>,
}

impl BleScanCallback {
    pub fn new(provider_event_tx: mpsc::Sender<ProviderEvent>) -> Self {
        Self { provider_event_tx }
    }

    pub fn on_advertisements(&self, reports: Vec<BleAdvertisingReport>) -> bool {
        self.send(Event::BleAdvertisement(reports))
    }

    /// A batch of advertisements has been fully delivered.
    pub fn on_batch_complete(&self) -> bool {
        self.send(Event::BleBatchComplete)
    }

    pub fn on_flush_complete(&self, result: AsyncResult) -> bool {
        self.send(Event::BleFlushComplete(result))
    }

    pub fn on_async_result(&self, result: AsyncResult) -> bool {
        self.send(Event::BleAsyncResult(result))
    }

    fn send(&self, event: Event) -> bool {
        update_engine(&self.provider_event_tx, ProviderEvent::Platform(event))
    }
}

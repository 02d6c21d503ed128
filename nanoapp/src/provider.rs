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

use log::{debug, error};
use tokio::sync::mpsc;

use crate::app_manager::Event;

/// Events sent from the providers to the engine loop.
#[derive(Debug)]
pub enum ProviderEvent {
    Platform(Event),
    Stop,
}

/// Hands `event` to the engine from a thread outside the runtime.
// See https://docs.rs/tokio/1.36.0/tokio/sync/mpsc/index.html#communicating-between-sync-and-async-code
pub(crate) fn update_engine(provider_tx: &mpsc::Sender<ProviderEvent>, event: ProviderEvent) -> bool {
    match provider_tx.blocking_send(event) {
        Ok(()) => {
            debug!("Provider callback sent an event.");
            true
        }
        Err(e) => {
            error!("Provider callback send error: {}", e);
            false
        }
    }
}

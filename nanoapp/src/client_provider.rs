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

use log::info;
use tokio::sync::mpsc;

use crate::app_manager::Event;
use crate::platform::EndpointId;
use crate::proto::FilterMessageType;
use crate::provider::{update_engine, ProviderEvent};

/// Handle the host side uses to reach the engine.
#[derive(Clone, Debug)]
pub struct ClientProvider {
    provider_event_tx: mpsc::Sender<ProviderEvent>,
}

impl ClientProvider {
    pub fn new(provider_event_tx: mpsc::Sender<ProviderEvent>) -> Self {
        Self { provider_event_tx }
    }

    pub fn on_message(&self, endpoint: EndpointId, message_type: u32, payload: Vec<u8>) -> bool {
        let message_type = FilterMessageType::from(message_type);
        self.send(ProviderEvent::Platform(Event::HostMessage { endpoint, message_type, payload }))
    }

    pub fn on_host_awake(&self) -> bool {
        self.send(ProviderEvent::Platform(Event::HostAwake))
    }

    pub fn on_host_asleep(&self) -> bool {
        self.send(ProviderEvent::Platform(Event::HostAsleep))
    }

    /// Ends the engine loop.
    pub fn stop(&self) -> bool {
        info!("Stop engine.");
        self.send(ProviderEvent::Stop)
    }

    fn send(&self, event: ProviderEvent) -> bool {
        update_engine(&self.provider_event_tx, event)
    }
}

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

use std::sync::mpsc;

use log::{error, info};

use crate::platform::{EndpointId, HostEndpointInfo, HostLink};
use crate::proto::{self, AdvReport, BleFilterResults, ExtConfigResponse, FilterMessageType, TrackerReport};

/// A message the engine sent to a host client.
#[derive(Clone, Debug, PartialEq)]
pub struct HostMessage {
    pub endpoint: EndpointId,
    pub message_type: FilterMessageType,
    pub payload: Vec<u8>,
}

/// Host side of the link: knows its client endpoints and forwards every
/// outbound message over a channel.
pub struct HostEmulator {
    endpoints: Vec<HostEndpointInfo>,
    message_tx: mpsc::Sender<HostMessage>,
}

impl HostEmulator {
    pub fn new(endpoints: Vec<HostEndpointInfo>, message_tx: mpsc::Sender<HostMessage>) -> Self {
        Self { endpoints, message_tx }
    }
}

impl HostLink for HostEmulator {
    fn send_message(&mut self, endpoint: EndpointId, message_type: FilterMessageType, payload: Vec<u8>) -> bool {
        info!("Host endpoint {} receives {:?} of {} bytes", endpoint, message_type, payload.len());
        if let Err(e) = self.message_tx.send(HostMessage { endpoint, message_type, payload }) {
            error!("Host emulator is gone: {}", e);
            return false;
        }
        true
    }

    fn host_endpoint_info(&self, endpoint: EndpointId) -> Option<HostEndpointInfo> {
        self.endpoints.iter().find(|info| info.endpoint_id == endpoint).cloned()
    }
}

/// Human readable form of `message` for the demo output.
pub fn describe(message: &HostMessage) -> String {
    let body = match message.message_type {
        FilterMessageType::FilterResults => match proto::decode::<BleFilterResults>(&message.payload) {
            Ok(results) => format!("{:?}", results),
            // Extension results carry a single raw report.
            Err(_) => match proto::decode::<AdvReport>(&message.payload) {
                Ok(report) => format!("{:?}", report),
                Err(e) => format!("undecodable: {}", e),
            },
        },
        FilterMessageType::TrackerReport => match proto::decode::<TrackerReport>(&message.payload) {
            Ok(report) => format!("{:?}", report),
            Err(e) => format!("undecodable: {}", e),
        },
        FilterMessageType::ExtConfigResponse => match proto::decode::<ExtConfigResponse>(&message.payload) {
            Ok(response) => format!("{:?}", response),
            Err(e) => format!("undecodable: {}", e),
        },
        _ => format!("{} bytes", message.payload.len()),
    };
    format!("endpoint {} {:?}: {}", message.endpoint, message.message_type, body)
}

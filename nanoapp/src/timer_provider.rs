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

use std::collections::HashMap;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::debug;
use tokio::time::sleep;

use crate::platform::TimerService;
use crate::timer::TimerId;

#[derive(Clone, Copy, Debug)]
struct ArmedTimer {
    delay: Duration,
    one_shot: bool,
}

/// Tokio backed timers. Each armed timer is a sleep future polled by the
/// engine loop through [`TimerProvider::next_fired`].
#[derive(Default)]
pub struct TimerProvider {
    next_id: u32,
    armed: HashMap<TimerId, ArmedTimer>,
    timers: FuturesUnordered<BoxFuture<'static, TimerId>>,
}

impl TimerProvider {
    pub fn new() -> Self {
        TimerProvider::default()
    }

    fn schedule(&mut self, id: TimerId, delay: Duration) {
        self.timers.push(
            async move {
                sleep(delay).await;
                id
            }
            .boxed(),
        );
    }

    /// Waits for the next armed timer to expire. Periodic timers are armed
    /// again before returning. Never resolves while no timer is armed.
    pub async fn next_fired(&mut self) -> TimerId {
        loop {
            let Some(id) = self.timers.next().await else {
                return std::future::pending().await;
            };
            // Cancelled timers still have a sleep in flight.
            let Some(timer) = self.armed.get(&id).copied() else {
                continue;
            };
            if timer.one_shot {
                self.armed.remove(&id);
            } else {
                self.schedule(id, timer.delay);
            }
            debug!("Timer {:?} fired", id);
            return id;
        }
    }
}

#[cfg(test)]
impl TimerProvider {
    pub fn is_armed(&self, id: TimerId) -> bool {
        self.armed.contains_key(&id)
    }
}

impl TimerService for TimerProvider {
    fn set_timer(&mut self, delay_ns: u64, one_shot: bool) -> Option<TimerId> {
        self.next_id = self.next_id.checked_add(1)?;
        let id = TimerId(self.next_id);
        let delay = Duration::from_nanos(delay_ns);
        self.armed.insert(id, ArmedTimer { delay, one_shot });
        self.schedule(id, delay);
        Some(id)
    }

    fn cancel_timer(&mut self, id: TimerId) -> bool {
        self.armed.remove(&id).is_some()
    }
}

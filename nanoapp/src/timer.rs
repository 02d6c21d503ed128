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

use crate::platform::TimerService;

/// Opaque token naming a timer armed through a `TimerService`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(pub u32);

/// A timer with a fixed period that can be armed and cancelled repeatedly.
#[derive(Debug)]
pub struct Timer {
    delay_ns: u64,
    one_shot: bool,
    id: Option<TimerId>,
}

impl Timer {
    pub fn new(delay_ns: u64, one_shot: bool) -> Self {
        Timer { delay_ns, one_shot, id: None }
    }

    pub fn set_delay_ns(&mut self, delay_ns: u64) {
        self.delay_ns = delay_ns;
    }

    /// Arms the timer unless it is already armed.
    pub fn start<T: TimerService + ?Sized>(&mut self, timers: &mut T) -> bool {
        if self.id.is_some() {
            return true;
        }
        self.id = timers.set_timer(self.delay_ns, self.one_shot);
        match self.id {
            Some(id) => {
                debug!("Armed timer {:?} for {} ns", id, self.delay_ns);
                true
            }
            None => {
                error!("Failed to arm a timer for {} ns", self.delay_ns);
                false
            }
        }
    }

    pub fn stop<T: TimerService + ?Sized>(&mut self, timers: &mut T) {
        if let Some(id) = self.id.take() {
            timers.cancel_timer(id);
        }
    }

    pub fn id(&self) -> Option<TimerId> {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }

    /// Returns true if `id` names this timer. A fired one-shot timer is
    /// disarmed so that the next `start` arms it again.
    pub fn fired(&mut self, id: TimerId) -> bool {
        if self.id != Some(id) {
            return false;
        }
        if self.one_shot {
            self.id = None;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakePlatform;

    #[test]
    fn start_is_idempotent() {
        let mut platform = FakePlatform::new();
        let mut timer = Timer::new(1_000, false);
        assert!(timer.start(&mut platform));
        assert!(timer.start(&mut platform));
        assert_eq!(platform.active_timers.len(), 1);

        timer.stop(&mut platform);
        assert!(!timer.is_active());
        assert!(platform.active_timers.is_empty());
    }

    #[test]
    fn one_shot_disarms_when_fired() {
        let mut platform = FakePlatform::new();
        let mut timer = Timer::new(1_000, true);
        timer.start(&mut platform);
        let id = timer.id().unwrap();
        assert!(!timer.fired(TimerId(id.0 + 1)));
        assert!(timer.fired(id));
        assert!(!timer.is_active());

        let mut periodic = Timer::new(1_000, false);
        periodic.start(&mut platform);
        let id = periodic.id().unwrap();
        assert!(periodic.fired(id));
        assert!(periodic.is_active());
    }
}

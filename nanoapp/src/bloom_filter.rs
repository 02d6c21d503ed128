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

use sha2::{Digest, Sha256};

/// Account key filter advertised by Fast Pair providers.
/// https://developers.google.com/nearby/fast-pair/specifications/service/provider#AccountKeyFilter
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BloomFilter {
    filter: [u8; Self::MAX_FILTER_SIZE],
    size: usize,
}

impl BloomFilter {
    pub const MAX_FILTER_SIZE: usize = 16;
    const NUM_HASHES: usize = 8;

    /// Copies at most `MAX_FILTER_SIZE` bytes of `filter`.
    pub fn new(filter: &[u8]) -> Self {
        let size = filter.len().min(Self::MAX_FILTER_SIZE);
        let mut bytes = [0u8; Self::MAX_FILTER_SIZE];
        bytes[..size].copy_from_slice(&filter[..size]);
        BloomFilter { filter: bytes, size }
    }

    /// Returns false if `key` was definitely never added. The SHA-256 of the
    /// key is split into eight big-endian words; each selects one filter bit.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        if self.size == 0 {
            return false;
        }
        let bits = (self.size * 8) as u32;
        let hash = Sha256::digest(key);
        hash.chunks_exact(4).take(Self::NUM_HASHES).all(|word| {
            let word = u32::from_be_bytes([word[0], word[1], word[2], word[3]]);
            let bit = (word % bits) as usize;
            self.filter[bit / 8] & (1 << (bit % 8)) != 0
        })
    }
}

#[cfg(test)]
impl BloomFilter {
    /// Sets the bits of `key`, as a provider does when building its filter.
    pub fn add(&mut self, key: &[u8]) {
        if self.size == 0 {
            return;
        }
        let bits = (self.size * 8) as u32;
        let hash = Sha256::digest(key);
        for word in hash.chunks_exact(4).take(Self::NUM_HASHES) {
            let word = u32::from_be_bytes([word[0], word[1], word[2], word[3]]);
            let bit = (word % bits) as usize;
            self.filter[bit / 8] |= 1 << (bit % 8);
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.filter[..self.size]
    }
}

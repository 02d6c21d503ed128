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

//! Crypto glue for Presence v1 advertisements: key derivation, AES-CTR and
//! metadata key tag verification.

use aes::{Aes128, Aes256};
use ctr::cipher::{KeyIvInit, StreamCipher};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;
type HmacSha256 = Hmac<Sha256>;

const HKDF_SALT: &[u8] = b"Google Nearby";
const AES_128_KEY_LENGTH: usize = 16;
const AES_256_KEY_LENGTH: usize = 32;
const AES_CTR_NONCE_LENGTH: usize = 16;
const HMAC_KEY_LENGTH: usize = 32;

#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Clone)]
pub enum CryptoError {
    /// AES keys must be 16 or 32 bytes.
    #[error("invalid AES key length: {0}")]
    InvalidKeyLength(usize),
    /// AES-CTR nonces must be one block.
    #[error("invalid AES-CTR nonce length: {0}")]
    InvalidNonceLength(usize),
    /// HKDF cannot produce the requested output length.
    #[error("key derivation failed for {0} bytes")]
    KeyDerivation(usize),
    /// The HMAC implementation rejected the key.
    #[error("invalid HMAC key length: {0}")]
    InvalidMacKeyLength(usize),
}

/// HKDF-SHA256 with the Nearby salt.
pub fn hkdf_sha256(ikm: &[u8], info: &[u8], out: &mut [u8]) -> Result<(), CryptoError> {
    Hkdf::<Sha256>::new(Some(HKDF_SALT), ikm)
        .expand(info, out)
        .map_err(|_| CryptoError::KeyDerivation(out.len()))
}

/// AES-CTR with a 128-bit big-endian counter. Encryption and decryption are
/// the same operation. The key length selects AES-128 or AES-256.
pub fn aes_ctr(key: &[u8], nonce: &[u8], input: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if nonce.len() != AES_CTR_NONCE_LENGTH {
        return Err(CryptoError::InvalidNonceLength(nonce.len()));
    }
    let mut output = input.to_vec();
    match key.len() {
        AES_128_KEY_LENGTH => Aes128Ctr::new_from_slices(key, nonce)
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?
            .apply_keystream(&mut output),
        AES_256_KEY_LENGTH => Aes256Ctr::new_from_slices(key, nonce)
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?
            .apply_keystream(&mut output),
        other => return Err(CryptoError::InvalidKeyLength(other)),
    }
    Ok(output)
}

/// HMAC-SHA256 of `input` under `key`.
pub fn hmac_sha256(key: &[u8], input: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|_| CryptoError::InvalidMacKeyLength(key.len()))?;
    mac.update(input);
    Ok(mac.finalize().into_bytes().into())
}

/// Capabilities the Presence v1 decoder needs from a crypto variant.
pub trait Crypto {
    /// Decrypts `input` with material derived from the advertisement `salt`
    /// and the certificate authenticity `key`.
    fn decrypt(&self, input: &[u8], salt: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Returns true if `signature` authenticates `input` under material
    /// derived from `key`. Comparison runs in constant time.
    fn verify(&self, input: &[u8], key: &[u8], signature: &[u8]) -> bool;
}

/// HKDF info strings of one Presence v1 section flavour.
#[derive(Debug)]
struct SectionLabels {
    aes_key: &'static [u8],
    iv: &'static [u8],
    metadata_key_hmac_key: &'static [u8],
}

const MIC_SECTION_LABELS: SectionLabels = SectionLabels {
    aes_key: b"Unsigned Section AES key",
    iv: b"Unsigned Section IV",
    metadata_key_hmac_key: b"Unsigned Section metadata key HMAC key",
};

const IDENTITY_SECTION_LABELS: SectionLabels = SectionLabels {
    aes_key: b"Unsigned Identity AES key",
    iv: b"Unsigned Identity IV",
    metadata_key_hmac_key: b"Unsigned Identity metadata key HMAC key",
};

/// Presence v1 crypto. `mic()` serves MIC-authenticated sections and
/// `identity()` serves identity-only sections; they differ only in their key
/// derivation labels.
#[derive(Debug)]
pub struct CryptoV1 {
    labels: &'static SectionLabels,
}

impl CryptoV1 {
    pub const fn mic() -> Self {
        CryptoV1 { labels: &MIC_SECTION_LABELS }
    }

    pub const fn identity() -> Self {
        CryptoV1 { labels: &IDENTITY_SECTION_LABELS }
    }

    fn derive<const N: usize>(ikm: &[u8], info: &[u8]) -> Result<[u8; N], CryptoError> {
        let mut out = [0u8; N];
        hkdf_sha256(ikm, info, &mut out)?;
        Ok(out)
    }

    /// Computes the metadata encryption key tag of an identity under `key`.
    pub fn metadata_encryption_key_tag(&self, identity: &[u8], key: &[u8]) -> Result<[u8; 32], CryptoError> {
        let hmac_key: [u8; HMAC_KEY_LENGTH] = Self::derive(key, self.labels.metadata_key_hmac_key)?;
        hmac_sha256(&hmac_key, identity)
    }
}

#[cfg(test)]
impl CryptoV1 {
    /// Encrypts `plaintext` the way an advertiser would. AES-CTR is symmetric,
    /// so this is the inverse of `decrypt`.
    pub fn encrypt(&self, plaintext: &[u8], salt: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.decrypt(plaintext, salt, key)
    }
}

impl Crypto for CryptoV1 {
    fn decrypt(&self, input: &[u8], salt: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let aes_key: [u8; AES_128_KEY_LENGTH] = Self::derive(key, self.labels.aes_key)?;
        let nonce: [u8; AES_CTR_NONCE_LENGTH] = Self::derive(salt, self.labels.iv)?;
        aes_ctr(&aes_key, &nonce, input)
    }

    fn verify(&self, input: &[u8], key: &[u8], signature: &[u8]) -> bool {
        match self.metadata_encryption_key_tag(input, key) {
            Ok(tag) => tag.as_slice().ct_eq(signature).into(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticity_key() -> Vec<u8> {
        (0x20u8..0x40).collect()
    }

    #[test]
    fn derives_unsigned_section_keys() {
        let mut aes_key = [0u8; 16];
        hkdf_sha256(&authenticity_key(), b"Unsigned Section AES key", &mut aes_key).unwrap();
        assert_eq!(hex::encode(aes_key), "255f9d51fbc760c4f0c1dea8ae39666c");

        let mut nonce = [0u8; 16];
        hkdf_sha256(&[0xAB, 0xCD], b"Unsigned Section IV", &mut nonce).unwrap();
        assert_eq!(hex::encode(nonce), "2a30e00f7659265a78858a41cef8796b");
    }

    #[test]
    fn hmac_matches_rfc4231_vector() {
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(hex::encode(mac), "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843");
    }

    #[test]
    fn decrypts_known_ciphertext() {
        let cipher_text =
            hex::decode("e3293bf4ca3d6eaaed71d0caf752195bee17f56af534190e").unwrap();
        let plain = CryptoV1::mic()
            .decrypt(&cipher_text, &[0xAB, 0xCD], &authenticity_key())
            .unwrap();
        let mut expected: Vec<u8> = (0u8..16).collect();
        expected.extend_from_slice(&[0x15, 20, 0x37, 0, 1, 2, 0x16, 124]);
        assert_eq!(plain, expected);
    }

    #[test]
    fn verifies_metadata_key_tag() {
        let identity: Vec<u8> = (0u8..16).collect();
        let tag = hex::decode("353f929130a0e9c32e8d6078d1406e103f7c61dba4a8fa5c0677003e84d8aea1")
            .unwrap();
        let crypto = CryptoV1::mic();
        assert!(crypto.verify(&identity, &authenticity_key(), &tag));

        let mut tampered = identity.clone();
        tampered[3] ^= 0x01;
        assert!(!crypto.verify(&tampered, &authenticity_key(), &tag));
        assert!(!crypto.verify(&identity, &authenticity_key(), &tag[..31]));
    }

    #[test]
    fn identity_variant_uses_distinct_labels() {
        let key = authenticity_key();
        let plain = b"sixteen byte id!";
        let mic = CryptoV1::mic().encrypt(plain, &[1, 2], &key).unwrap();
        let identity = CryptoV1::identity().encrypt(plain, &[1, 2], &key).unwrap();
        assert_ne!(mic, identity);
        assert_eq!(CryptoV1::identity().decrypt(&identity, &[1, 2], &key).unwrap(), plain);
    }

    #[test]
    fn aes_ctr_rejects_bad_lengths() {
        assert_eq!(aes_ctr(&[0; 15], &[0; 16], &[1]), Err(CryptoError::InvalidKeyLength(15)));
        assert_eq!(aes_ctr(&[0; 16], &[0; 8], &[1]), Err(CryptoError::InvalidNonceLength(8)));
        assert_eq!(aes_ctr(&[0; 32], &[0; 16], &[1, 2, 3]).map(|out| out.len()), Ok(3));
    }
}

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

use serde::{Deserialize, Serialize};

use super::BluetoothError;

/// BLE Addresses can either be the peripheral's public MAC address, various
/// types of random addresses, or absent for anonymous advertisements.
/// Discriminants follow the controller's address-type encoding.
#[derive(
    PartialEq, Eq, Clone, Copy, Debug, Hash, Default, Serialize, Deserialize,
)]
pub enum BleAddressKind {
    #[default]
    Public = 0x00,
    Random = 0x01,
    PublicIdentity = 0x02,
    RandomIdentity = 0x03,
    NoAddress = 0xFF,
}

impl TryFrom<u8> for BleAddressKind {
    type Error = BluetoothError;

    fn try_from(kind: u8) -> Result<Self, Self::Error> {
        match kind {
            0x00 => Ok(BleAddressKind::Public),
            0x01 => Ok(BleAddressKind::Random),
            0x02 => Ok(BleAddressKind::PublicIdentity),
            0x03 => Ok(BleAddressKind::RandomIdentity),
            0xFF => Ok(BleAddressKind::NoAddress),
            other => Err(BluetoothError::BadTypeConversion(format!(
                "unknown BLE address type {:#04x}",
                other
            ))),
        }
    }
}

/// Struct representing a 48-bit BLE Address and its type. Bytes are kept in
/// over-the-air (little-endian) order.
#[derive(
    PartialEq, Eq, Clone, Copy, Debug, Hash, Default, Serialize, Deserialize,
)]
pub struct BleAddress {
    val: [u8; 6],
    kind: BleAddressKind,
}

impl BleAddress {
    /// `BleAddress` constructor.
    pub fn new(addr: u64, kind: BleAddressKind) -> Self {
        let addr = u64_to_6lsb(addr);

        BleAddress { val: addr, kind }
    }

    /// Builds an address from its six over-the-air bytes.
    pub fn from_bytes(val: [u8; 6], kind: BleAddressKind) -> Self {
        BleAddress { val, kind }
    }

    /// Retrieve the type of BLE Address (public, random, ...).
    pub fn get_kind(&self) -> BleAddressKind {
        self.kind
    }

    /// Retrieve the six address bytes in over-the-air order.
    pub fn bytes(&self) -> &[u8; 6] {
        &self.val
    }
}

/// Function for converting the six LSB of a u64 into a 6-byte array.
#[inline]
fn u64_to_6lsb(num: u64) -> [u8; 6] {
    let bytes = num.to_le_bytes();
    [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]]
}

impl From<BleAddress> for u64 {
    fn from(addr: BleAddress) -> Self {
        let mut bytes = [0u8; 8];
        bytes[..6].copy_from_slice(&addr.val);

        u64::from_le_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ble_address_new() {
        let addr = BleAddress::new(0x112233445566, BleAddressKind::Public);
        assert_eq!(addr.val, [0x66, 0x55, 0x44, 0x33, 0x22, 0x11]);
        assert_eq!(addr.kind, BleAddressKind::Public);
    }

    #[test]
    fn ble_address_get_kind() {
        let addr_public =
            BleAddress::new(0x112233445566, BleAddressKind::Public);
        assert_eq!(addr_public.get_kind(), BleAddressKind::Public);

        let addr_random =
            BleAddress::new(0xAABBCCDDEEFF, BleAddressKind::Random);
        assert_eq!(addr_random.get_kind(), BleAddressKind::Random);
    }

    #[test]
    fn ble_address_into_u64() {
        let ble_addr = BleAddress::new(0x112233445566, BleAddressKind::Public);
        let u64_addr: u64 = ble_addr.into();
        assert_eq!(u64_addr, 0x112233445566);
    }

    #[test]
    fn ble_address_kind_from_u8() {
        assert_eq!(
            BleAddressKind::try_from(0x01),
            Ok(BleAddressKind::Random)
        );
        assert_eq!(
            BleAddressKind::try_from(0xFF),
            Ok(BleAddressKind::NoAddress)
        );
        assert!(matches!(
            BleAddressKind::try_from(0x07),
            Err(BluetoothError::BadTypeConversion(_)),
        ));
    }

    #[test]
    fn test_u64_to_6lsb() {
        // Test a case where the input number is smaller than 6 bytes
        let num = 0x123456;
        let expected_result = [0x56, 0x34, 0x12, 0, 0, 0];
        assert_eq!(u64_to_6lsb(num), expected_result);

        // Test a case where the number is too large so the two most significant
        // bytes get dropped.
        let num = 0x1122334455667788;
        let expected_result = [0x88, 0x77, 0x66, 0x55, 0x44, 0x33];
        assert_eq!(u64_to_6lsb(num), expected_result);
    }
}

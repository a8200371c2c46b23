//! LoRaWAN identifiers and region tables.
//!
//! This module provides the fixed-length identifiers used throughout the
//! crate and the regional channel plans needed to rebuild channel state:
//!
//! * [`Eui64`]: device and join EUIs (8 bytes)
//! * [`DevAddr`]: the reassignable network address (4 bytes)
//! * [`AesKey`]: AES-128 session keys (16 bytes)
//! * [`band`]: regional uplink channel tables
//! * [`crypto`]: FRMPayload encryption
//!
//! All identifiers render as lowercase hex and parse from hex, which is also
//! their serde representation.

pub mod band;
pub mod crypto;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors produced when parsing identifiers from text or bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    /// The input was not valid hexadecimal.
    #[error("invalid hex '{input}': {reason}")]
    InvalidHex {
        /// The offending input
        input: String,
        /// Why decoding failed
        reason: String,
    },

    /// The decoded value had the wrong number of bytes.
    #[error("expected {expected} bytes, got {actual}")]
    WrongLength {
        /// Required length in bytes
        expected: usize,
        /// Decoded length in bytes
        actual: usize,
    },
}

macro_rules! hex_identifier {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Length of the identifier in bytes.
            pub const LEN: usize = $len;

            /// Build from a byte slice of exactly [`Self::LEN`] bytes.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, IdParseError> {
                let arr: [u8; $len] =
                    bytes.try_into().map_err(|_| IdParseError::WrongLength {
                        expected: $len,
                        actual: bytes.len(),
                    })?;
                Ok(Self(arr))
            }

            /// Build from a slice, zero-filling or truncating to [`Self::LEN`].
            ///
            /// Used when reading stored records that predate length checks.
            #[must_use]
            pub fn from_slice_lossy(bytes: &[u8]) -> Self {
                let mut arr = [0u8; $len];
                let n = bytes.len().min($len);
                arr[..n].copy_from_slice(&bytes[..n]);
                Self(arr)
            }

            /// Raw bytes.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Whether every byte is zero.
            #[must_use]
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(s).map_err(|e| IdParseError::InvalidHex {
                    input: s.to_string(),
                    reason: e.to_string(),
                })?;
                Self::from_slice(&bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_identifier!(
    /// 64-bit extended unique identifier (DevEUI / JoinEUI).
    Eui64,
    8
);

hex_identifier!(
    /// 32-bit device address, in network (big-endian) byte order.
    DevAddr,
    4
);

hex_identifier!(
    /// AES-128 key.
    AesKey,
    16
);

/// Returns true when the MAC version string denotes a LoRaWAN 1.0.x device.
///
/// 1.0.x devices use a single downlink counter (`NFCntDown`); 1.1 devices keep
/// a separate application counter (`AFCntDown`).
#[must_use]
pub fn is_lorawan_1_0(mac_version: &str) -> bool {
    mac_version.starts_with("1.0")
}

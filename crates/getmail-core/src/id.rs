//! Time-ordered message identifiers (UUID version 7)

use chrono::Utc;
use getmail_common::{Error, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// A UUIDv7: 48-bit millisecond timestamp, version and variant bits, random tail
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UuidV7([u8; 16]);

impl UuidV7 {
    /// Generate an identifier for the current instant
    pub fn new() -> Result<Self> {
        let mut random = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut random)
            .map_err(|e| Error::Internal(format!("Random source unavailable: {}", e)))?;

        let millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        Ok(Self::from_parts(millis, random))
    }

    /// Build an identifier from a timestamp and random bytes.
    ///
    /// Only the low 48 bits of `millis` are kept. The first six bytes of
    /// `random` are overwritten by the timestamp.
    pub fn from_parts(millis: u64, random: [u8; 16]) -> Self {
        let mut bytes = random;
        bytes[..6].copy_from_slice(&millis.to_be_bytes()[2..]);
        bytes[6] = (bytes[6] & 0x0F) | 0x70;
        bytes[8] = (bytes[8] & 0x3F) | 0x80;
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Millisecond timestamp encoded in the identifier
    pub fn timestamp_millis(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf[2..].copy_from_slice(&self.0[..6]);
        u64::from_be_bytes(buf)
    }

    pub fn as_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.0)
    }
}

impl fmt::Display for UuidV7 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.as_uuid().hyphenated(), f)
    }
}

impl Serialize for UuidV7 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

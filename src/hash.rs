//! 32-byte digests used for salts, payload hashes and commitments

use sha2::{Digest, Sha256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::address::Address;
use crate::error::DeployError;

/// SHA256 digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash32([u8; 32]);

impl Hash32 {
    /// The all-zero digest. Never a valid commitment.
    pub const ZERO: Hash32 = Hash32([0u8; 32]);

    /// Compute a digest from raw bytes
    pub fn digest(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Compute a digest from a string
    pub fn of_str(content: &str) -> Self {
        Self::digest(content.as_bytes())
    }

    /// Start an incremental digest over several typed fields
    pub fn builder() -> HashBuilder {
        HashBuilder(Sha256::new())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Get the 0x-prefixed hex string representation
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Hash32 {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| DeployError::InvalidDocument(format!("invalid hash '{}': {}", s, e)))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Hash32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Incremental digest over fixed-width fields.
///
/// Fields are concatenated without separators, so every field written here
/// has a fixed width except `bytes`, which callers only use last or pre-hashed.
pub struct HashBuilder(Sha256);

impl HashBuilder {
    pub fn byte(mut self, b: u8) -> Self {
        self.0.update([b]);
        self
    }

    pub fn address(mut self, address: &Address) -> Self {
        self.0.update(address.as_bytes());
        self
    }

    pub fn hash(mut self, hash: &Hash32) -> Self {
        self.0.update(hash.as_bytes());
        self
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.0.update(value.to_be_bytes());
        self
    }

    pub fn u128(mut self, value: u128) -> Self {
        self.0.update(value.to_be_bytes());
        self
    }

    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.0.update(data);
        self
    }

    pub fn finish(self) -> Hash32 {
        Hash32(self.0.finalize().into())
    }
}

/// Stable salt for an entry key within a system salt namespace.
///
/// Returns the salt together with the human-readable salt string it was
/// derived from.
pub fn derive_salt(prefix: &str, key: &str) -> (Hash32, String) {
    let salt_string = format!("{}/{}", prefix, key);
    (Hash32::of_str(&salt_string), salt_string)
}

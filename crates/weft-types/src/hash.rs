use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// A 32-byte content address.
///
/// Every addressed entity -- causals, namespaces, terms, types, patches, raw
/// byte blobs -- is identified by a `Hash32`. Identical content always
/// produces the same hash, making entities deduplicatable across stores.
///
/// On the wire a `Hash32` is a 64-character lowercase hex string, and that is
/// also its serde form (including as a JSON map key).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash32([u8; 32]);

impl Hash32 {
    /// Compute a `Hash32` from raw content bytes.
    pub fn digest(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create a `Hash32` from a pre-computed hash.
    pub const fn from_raw(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full hex-encoded string (64 lowercase characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({})", self.short_hex())
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for Hash32 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<Hash32> for [u8; 32] {
    fn from(hash: Hash32) -> Self {
        hash.0
    }
}

impl Serialize for Hash32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

struct Hash32Visitor;

impl Visitor<'_> for Hash32Visitor {
    type Value = Hash32;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a 64-character hex string")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Hash32, E> {
        Hash32::from_hex(value).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(Hash32Visitor)
    }
}

/// A `Hash32` known to address a causal (a node in the history DAG).
///
/// The restriction is purely type-level: the sync engine threads causal
/// hashes through head updates and spine searches, where handing it an
/// arbitrary object hash would be a bug.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct CausalHash(Hash32);

impl CausalHash {
    /// The underlying content address.
    pub fn hash(&self) -> Hash32 {
        self.0
    }

    /// Full hex-encoded string.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        self.0.short_hex()
    }
}

impl fmt::Debug for CausalHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CausalHash({})", self.short_hex())
    }
}

impl fmt::Display for CausalHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Hash32> for CausalHash {
    fn from(hash: Hash32) -> Self {
        Self(hash)
    }
}

impl From<CausalHash> for Hash32 {
    fn from(hash: CausalHash) -> Self {
        hash.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let h1 = Hash32::digest(b"hello world");
        let h2 = Hash32::digest(b"hello world");
        assert_eq!(h1, h2);
    }

    #[test]
    fn different_content_produces_different_hashes() {
        assert_ne!(Hash32::digest(b"hello"), Hash32::digest(b"world"));
    }

    #[test]
    fn hex_roundtrip() {
        let h = Hash32::digest(b"roundtrip");
        let parsed = Hash32::from_hex(&h.to_hex()).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn hex_is_lowercase_64_chars() {
        let hex = Hash32::digest(b"render").to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(hex, hex.to_lowercase());
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = Hash32::from_hex("abcd").unwrap_err();
        assert!(matches!(err, TypeError::InvalidLength { .. }));
    }

    #[test]
    fn from_hex_rejects_non_hex() {
        let err = Hash32::from_hex(&"zz".repeat(32)).unwrap_err();
        assert!(matches!(err, TypeError::InvalidHex(_)));
    }

    #[test]
    fn display_is_full_hex() {
        let h = Hash32::digest(b"display");
        assert_eq!(format!("{h}"), h.to_hex());
    }

    #[test]
    fn serde_is_hex_string() {
        let h = Hash32::digest(b"serde");
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{}\"", h.to_hex()));
        let parsed: Hash32 = serde_json::from_str(&json).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn works_as_json_map_key() {
        use std::collections::BTreeMap;
        let mut map = BTreeMap::new();
        map.insert(Hash32::digest(b"key"), 7u32);
        let json = serde_json::to_string(&map).unwrap();
        let parsed: BTreeMap<Hash32, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(map, parsed);
    }

    #[test]
    fn ordering_is_consistent() {
        let h1 = Hash32::from_raw([0; 32]);
        let h2 = Hash32::from_raw([1; 32]);
        assert!(h1 < h2);
    }

    #[test]
    fn causal_hash_roundtrips_through_hash32() {
        let h = Hash32::digest(b"causal");
        let c = CausalHash::from(h);
        assert_eq!(c.hash(), h);
        assert_eq!(Hash32::from(c), h);
        assert_eq!(c.to_hex(), h.to_hex());
    }

    #[test]
    fn causal_hash_serde_matches_inner() {
        let c = CausalHash::from(Hash32::digest(b"causal serde"));
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, serde_json::to_string(&c.hash()).unwrap());
        let parsed: CausalHash = serde_json::from_str(&json).unwrap();
        assert_eq!(c, parsed);
    }
}

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;
use crate::hash::{CausalHash, Hash32};

/// Claims carried in a hash token payload.
///
/// Only the `h` claim (the hex content address) is interpreted locally;
/// anything else the server includes is preserved opaquely in the token.
#[derive(Deserialize, Serialize)]
struct Claims {
    h: String,
}

/// A server-signed token binding a [`Hash32`] to permission to fetch it.
///
/// The token is a standard three-segment `header.payload.signature` string.
/// The embedded hash is extracted locally **without verification** -- the
/// signature is consumed opaquely and only the server ever validates it.
///
/// Tokens are interchangeable with a bare hash wherever an entity is being
/// *downloaded*, but must never be used as a storage key: equality is on the
/// full token string, and one hash may circulate under many tokens.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashJwt {
    token: String,
    hash: Hash32,
}

impl HashJwt {
    /// Parse a token, extracting the embedded hash from the payload segment.
    ///
    /// The signature is not checked; malformed payloads fail with
    /// [`TypeError::MalformedToken`].
    pub fn from_token(token: impl Into<String>) -> Result<Self, TypeError> {
        let token = token.into();
        let hash = extract_hash(&token)?;
        Ok(Self { token, hash })
    }

    /// Mint an unsigned token for the given hash.
    ///
    /// Produces an `alg: none` token with an empty signature segment. Only
    /// the server can produce tokens it will accept back; this constructor
    /// exists for fixtures and in-process servers.
    pub fn unverified(hash: Hash32) -> Self {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let claims = Claims { h: hash.to_hex() };
        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&claims).expect("claims serialization cannot fail"),
        );
        Self {
            token: format!("{header}.{payload}."),
            hash,
        }
    }

    /// The embedded content address.
    pub fn hash(&self) -> Hash32 {
        self.hash
    }

    /// The embedded content address as a causal hash.
    pub fn causal_hash(&self) -> CausalHash {
        CausalHash::from(self.hash)
    }

    /// The raw token string.
    pub fn as_str(&self) -> &str {
        &self.token
    }
}

fn extract_hash(token: &str) -> Result<Hash32, TypeError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| TypeError::MalformedToken("missing payload segment".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| TypeError::MalformedToken(format!("payload is not base64url: {e}")))?;
    let claims: Claims = serde_json::from_slice(&bytes)
        .map_err(|e| TypeError::MalformedToken(format!("payload is not a hash claim: {e}")))?;
    Hash32::from_hex(&claims.h)
        .map_err(|e| TypeError::MalformedToken(format!("bad hash claim: {e}")))
}

impl fmt::Debug for HashJwt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashJwt({})", self.hash.short_hex())
    }
}

impl fmt::Display for HashJwt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

impl Serialize for HashJwt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.token)
    }
}

struct HashJwtVisitor;

impl Visitor<'_> for HashJwtVisitor {
    type Value = HashJwt;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a hash token string")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<HashJwt, E> {
        HashJwt::from_token(value).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for HashJwt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(HashJwtVisitor)
    }
}

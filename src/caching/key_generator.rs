//! # Cache Key Generator
//!
//! Turns an inbound request into a canonical cache key.
//!
//! Two requests that ask the upstream API the same question must produce the
//! same key, and two requests that ask different questions must not. The
//! canonical form is built in three steps:
//!
//! 1. The path is classified against [`ENDPOINT_TABLE`]. Endpoints listed
//!    there keep only their whitelisted parameters; every other path keeps all
//!    of them.
//! 2. The credential parameter is dropped.
//! 3. The remaining pairs are sorted by name, then value.
//!
//! The canonical form is hashed with SHA-256 and hex-encoded, optionally
//! behind a `prefix:` namespace.

use crate::core::types::{IncomingRequest, CREDENTIAL_PARAM};
use percent_encoding::{percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Endpoints whose cache fidelity depends on a fixed parameter subset.
///
/// Matched by path prefix, first entry wins.
pub const ENDPOINT_TABLE: &[(&str, EndpointClass)] = &[
    (
        "/maps/api/directions/",
        EndpointClass::Directions(&["origin", "destination"]),
    ),
    (
        "/maps/api/distancematrix/",
        EndpointClass::DistanceMatrix(&["origins", "destinations"]),
    ),
];

/// Classification of a request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    /// Every non-credential parameter participates in the key
    Generic,
    /// Directions-style endpoint keyed on its whitelisted fields only
    Directions(&'static [&'static str]),
    /// Distance-matrix-style endpoint keyed on its whitelisted fields only
    DistanceMatrix(&'static [&'static str]),
}

impl EndpointClass {
    /// Resolve a path against [`ENDPOINT_TABLE`]
    pub fn classify(path: &str) -> Self {
        ENDPOINT_TABLE
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix))
            .map(|(_, class)| *class)
            .unwrap_or(Self::Generic)
    }

    /// Stable tag mixed into the hash so classes never share keys
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Directions(_) => "directions",
            Self::DistanceMatrix(_) => "distancematrix",
        }
    }

    /// Whether a parameter participates in the key for this class
    pub fn keeps(&self, name: &[u8]) -> bool {
        match self {
            Self::Generic => true,
            Self::Directions(fields) | Self::DistanceMatrix(fields) => {
                fields.iter().any(|field| field.as_bytes() == name)
            }
        }
    }
}

/// Normalized representation of a request, the input to the digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalKeyInput {
    pub path: String,
    pub class: EndpointClass,
    /// Filtered pairs as decoded bytes, sorted by name then value
    pub params: Vec<(Vec<u8>, Vec<u8>)>,
}

impl CanonicalKeyInput {
    pub fn from_request(request: &IncomingRequest) -> Self {
        let path = request.path().to_string();
        let class = EndpointClass::classify(&path);

        let mut params: Vec<(Vec<u8>, Vec<u8>)> = request
            .query_pairs_raw()
            .into_iter()
            .filter(|(name, _)| name.as_slice() != CREDENTIAL_PARAM.as_bytes() && class.keeps(name))
            .collect();
        params.sort();

        Self { path, class, params }
    }

    /// Byte serialization fed to the hash.
    ///
    /// Lines are separated by `\n`, which cannot appear in a request path, and
    /// every name and value is percent-encoded byte for byte so none can forge
    /// a separator.
    pub fn to_bytes(&self) -> Vec<u8> {
        let query = self
            .params
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}",
                    percent_encode(name, NON_ALPHANUMERIC),
                    percent_encode(value, NON_ALPHANUMERIC)
                )
            })
            .collect::<Vec<_>>()
            .join("&");

        format!("{}\n{}\n{}", self.path, self.class.tag(), query).into_bytes()
    }

    /// Hex-encoded SHA-256 of [`Self::to_bytes`]
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Content-derived cache key, optionally namespaced as `prefix:digest`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(digest: String, prefix: &str) -> Self {
        if prefix.is_empty() {
            Self(digest)
        } else {
            Self(format!("{}:{}", prefix, digest))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives cache keys under a fixed namespace prefix
#[derive(Debug, Clone, Default)]
pub struct KeyGenerator {
    prefix: String,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Namespace keys as `prefix:digest`; an empty prefix means bare digests
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Derive the cache key for a request. Pure and infallible.
    pub fn derive(&self, request: &IncomingRequest) -> CacheKey {
        let input = CanonicalKeyInput::from_request(request);
        CacheKey::new(input.digest(), &self.prefix)
    }
}

//! Deterministic build-request signatures.

use crate::request::BuildRequest;
use crucible_core::Result;
use std::fmt;

/// A stable digest over a build request's full content, used as the cache
/// key. Two requests are the same compile attempt iff their signatures are
/// equal. Order-independence for reference sets comes from the request's
/// BTree collections, which serialize sorted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildSignature(String);

impl BuildSignature {
    pub fn of(request: &BuildRequest) -> Result<Self> {
        let canonical = serde_json::to_string(request)?;
        Ok(Self(blake3::hash(canonical.as_bytes()).to_hex().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

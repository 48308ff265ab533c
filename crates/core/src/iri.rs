//! IRI identifiers for individuals, classes, properties, and contexts
//!
//! An [`Iri`] is an interned, cheaply cloneable string wrapper. Sessions,
//! caches, and change sets pass identifiers around constantly, so clones
//! must be pointer copies rather than string copies.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Interned IRI
///
/// Wraps an `Arc<str>`, so cloning is a reference-count bump. Two IRIs are
/// equal when their textual forms are equal, regardless of provenance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Iri(Arc<str>);

impl Iri {
    /// Create an IRI from any string-like value
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(Arc::from(value.as_ref()))
    }

    /// The textual form of this IRI
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The fragment or final path segment, used in log output
    ///
    /// Falls back to the full IRI when there is no `#` or `/` separator.
    pub fn local_name(&self) -> &str {
        let s = self.as_str();
        match s.rfind(['#', '/']) {
            Some(idx) if idx + 1 < s.len() => &s[idx + 1..],
            _ => s,
        }
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Iri {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Iri {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl AsRef<str> for Iri {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

// Manual serde impls: `Arc<str>` has no Deserialize without the serde `rc`
// feature, and an IRI serializes as a plain string anyway.
impl Serialize for Iri {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Iri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Iri::from)
    }
}

/// Well-known vocabulary IRIs
pub mod vocab {
    use super::Iri;

    /// `rdf:type` property IRI
    pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

    /// The `rdf:type` property as an [`Iri`]
    pub fn rdf_type() -> Iri {
        Iri::new(RDF_TYPE)
    }
}

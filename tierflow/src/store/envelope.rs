//! Self-describing binary artifacts.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::ArtifactKind;

/// A persisted object together with its provenance.
///
/// Fitted transformers and trained models are stored this way so a reader can
/// rebuild them without re-deriving anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// What the payload is.
    pub kind: ArtifactKind,
    /// The object itself.
    pub payload: T,
    /// Feature names in column order.
    #[serde(default)]
    pub feature_names: Vec<String>,
    /// Provenance and fit statistics.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl<T> Envelope<T> {
    /// Wraps `payload`.
    #[must_use]
    pub fn new(kind: ArtifactKind, payload: T) -> Self {
        Self {
            kind,
            payload,
            feature_names: Vec::new(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Sets the feature names.
    #[must_use]
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = names;
        self
    }

    /// Sets the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

impl<T: Serialize> Envelope<T> {
    /// Encodes the envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Decodes an envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not an envelope of `T`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

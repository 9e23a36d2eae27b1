//! Path-addressed artifact persistence.
//!
//! Every write creates the destination directory first, returns an
//! [`ArtifactRecord`] describing the bytes on disk, and keeps no in-memory copy.
//! Paths ending in `.gz` are gzip-compressed on write and decompressed on read.

mod envelope;

pub use envelope::Envelope;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

use crate::core::{ArtifactKind, ArtifactRecord};
use crate::errors::{DataContractError, PipelineError};
use crate::frame::{self, Column, DataFrame};
use crate::quality::{QualityGate, QualityReport};
use crate::utils::sha256_hex;

/// Column holding the JSON-encoded run metadata in every tabular artifact.
pub const METADATA_COLUMN: &str = "processing_metadata";

/// Reads and writes pipeline artifacts.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactStore {
    gate: QualityGate,
}

impl ArtifactStore {
    /// Creates a store whose tabular writes are checked by `gate`.
    #[must_use]
    pub fn new(gate: QualityGate) -> Self {
        Self { gate }
    }

    /// The gate applied after tabular writes.
    #[must_use]
    pub fn gate(&self) -> &QualityGate {
        &self.gate
    }

    /// Writes `frame` as CSV with `metadata` embedded in [`METADATA_COLUMN`],
    /// then runs the Quality Gate on what was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_tabular(
        &self,
        path: &Path,
        kind: ArtifactKind,
        frame: &DataFrame,
        metadata: &serde_json::Value,
        context: &str,
    ) -> Result<(ArtifactRecord, QualityReport), PipelineError> {
        let mut stored = frame.clone();
        stored.insert_column(
            METADATA_COLUMN,
            Column::constant_text(&metadata.to_string(), frame.n_rows()),
        )?;

        let mut buf = Vec::new();
        frame::write_csv(&stored, &mut buf)
            .map_err(|e| PipelineError::Serialization(e.to_string()))?;
        let record = self.write_bytes(path, kind, &buf, false)?;

        let report = self.gate.validate(Some(&stored), context);
        Ok((record, report))
    }

    /// Loads a tabular artifact.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file is unreadable and a data-contract error
    /// if it is not valid CSV.
    pub fn read_tabular(&self, path: &Path) -> Result<DataFrame, PipelineError> {
        let bytes = self.read_bytes(path)?;
        frame::read_csv(bytes.as_slice())
            .map_err(|e| PipelineError::from(DataContractError::malformed(path, e.message)))
    }

    /// Writes raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_binary(
        &self,
        path: &Path,
        kind: ArtifactKind,
        blob: &[u8],
    ) -> Result<ArtifactRecord, PipelineError> {
        self.write_bytes(path, kind, blob, false)
    }

    /// Reads raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decompressed.
    pub fn read_binary(&self, path: &Path) -> Result<Vec<u8>, PipelineError> {
        self.read_bytes(path)
    }

    /// Serializes `value` as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_json<T: Serialize>(
        &self,
        path: &Path,
        kind: ArtifactKind,
        value: &T,
    ) -> Result<ArtifactRecord, PipelineError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(path, kind, &bytes, false)
    }

    /// Loads a JSON artifact.
    ///
    /// # Errors
    ///
    /// Returns a data-contract error if the content does not match `T`.
    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T, PipelineError> {
        let bytes = self.read_bytes(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| DataContractError::malformed(path, e).into())
    }

    /// Writes a degraded-tier placeholder in place of a real artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_placeholder(
        &self,
        path: &Path,
        kind: ArtifactKind,
        value: &serde_json::Value,
    ) -> Result<ArtifactRecord, PipelineError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(path, kind, &bytes, true)
    }

    /// Writes a binary envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_envelope<T: Serialize>(
        &self,
        path: &Path,
        envelope: &Envelope<T>,
    ) -> Result<ArtifactRecord, PipelineError> {
        let bytes = envelope.to_bytes()?;
        self.write_binary(path, envelope.kind, &bytes)
    }

    /// Loads a binary envelope and checks its kind.
    ///
    /// # Errors
    ///
    /// Returns a data-contract error if the envelope is malformed or holds a
    /// different kind of artifact.
    pub fn read_envelope<T: DeserializeOwned>(
        &self,
        path: &Path,
        expected: ArtifactKind,
    ) -> Result<Envelope<T>, PipelineError> {
        let bytes = self.read_binary(path)?;
        let envelope = Envelope::<T>::from_bytes(&bytes)
            .map_err(|e| DataContractError::malformed(path, e))?;
        if envelope.kind != expected {
            return Err(DataContractError::malformed(
                path,
                format!("expected a {expected} artifact, found {}", envelope.kind),
            )
            .into());
        }
        Ok(envelope)
    }

    fn write_bytes(
        &self,
        path: &Path,
        kind: ArtifactKind,
        bytes: &[u8],
        placeholder: bool,
    ) -> Result<ArtifactRecord, PipelineError> {
        ensure_parent_dir(path)?;

        let on_disk = if is_compressed(path) {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(bytes)
                .map_err(|e| PipelineError::artifact_io(path, e))?;
            encoder
                .finish()
                .map_err(|e| PipelineError::artifact_io(path, e))?
        } else {
            bytes.to_vec()
        };

        fs::write(path, &on_disk).map_err(|e| PipelineError::artifact_io(path, e))?;
        debug!(path = %path.display(), %kind, bytes = on_disk.len(), "Artifact written");

        Ok(ArtifactRecord {
            kind,
            path: path.to_path_buf(),
            bytes: on_disk.len() as u64,
            sha256: sha256_hex(&on_disk),
            placeholder,
        })
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, PipelineError> {
        let raw = fs::read(path).map_err(|e| PipelineError::artifact_io(path, e))?;
        if !is_compressed(path) {
            return Ok(raw);
        }
        let mut decoded = Vec::new();
        GzDecoder::new(raw.as_slice())
            .read_to_end(&mut decoded)
            .map_err(|e| DataContractError::malformed(path, e))?;
        Ok(decoded)
    }
}

fn is_compressed(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

fn ensure_parent_dir(path: &Path) -> Result<(), PipelineError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| PipelineError::artifact_io(parent, e))
        }
        _ => Ok(()),
    }
}

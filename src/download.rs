//! Saving downloaded payloads to disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SscnResult;
use crate::page::PAYLOAD_FIELD;
use crate::standard::Standard;
use crate::value::FieldValue;

/// File extension of saved payloads.
pub const PAYLOAD_SUFFIX: &str = "pdf";

/// Result of [`save_payload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The payload was downloaded and written.
    Saved(PathBuf),
    /// A file already existed; nothing was fetched.
    AlreadyExists(PathBuf),
    /// No source could provide the payload.
    NotFound,
}

impl SaveOutcome {
    /// The file path, unless the payload was not found.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Saved(path) | Self::AlreadyExists(path) => Some(path),
            Self::NotFound => None,
        }
    }
}

/// Downloads the payload of `standard` into `dir`.
///
/// The file is named after the code with [`PAYLOAD_SUFFIX`] (see
/// [`Standard::file_name`]). Existing
/// files are left untouched.
///
/// # Errors
///
/// Validation and contract errors from resolution, or I/O errors while
/// writing.
pub fn save_payload(standard: &Standard, dir: &Path) -> SscnResult<SaveOutcome> {
    let path = dir.join(standard.file_name(PAYLOAD_SUFFIX)?);
    if path.exists() {
        tracing::info!(path = %path.display(), "payload already saved");
        return Ok(SaveOutcome::AlreadyExists(path));
    }

    let FieldValue::Bytes(bytes) = standard.get_field(PAYLOAD_FIELD)? else {
        tracing::info!(code = %standard.code(), "payload not found");
        return Ok(SaveOutcome::NotFound);
    };

    fs::create_dir_all(dir)?;
    fs::write(&path, bytes)?;
    tracing::info!(code = %standard.code(), path = %path.display(), "payload saved");
    Ok(SaveOutcome::Saved(path))
}

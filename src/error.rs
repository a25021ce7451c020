// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Unified error type for the resign engine.

use thiserror::Error;

/// Unified error type for the VEO resign engine.
#[derive(Debug, Error)]
pub enum ResignError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to load credential: {0}")]
    CredentialLoad(String),

    #[error("credential container contains no usable key/certificate pair")]
    CredentialEmpty,

    #[error("archive appears truncated: compressed size exceeds file size")]
    ArchiveTruncated,

    #[error("archive entry {0:?} does not belong under the declared VEO name")]
    ArchiveMislabeled(String),

    #[error("archive entry {0:?} would escape the output root")]
    ArchiveEscape(String),

    #[error("archive target already exists and overwrite was not requested: {0}")]
    ArchiveExists(String),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("signature document is malformed: {0}")]
    SignatureMalformed(String),

    #[error("failed to read payload for verification: {0}")]
    VerifyIo(String),

    #[error("unsupported hash/signature algorithm combination: {0}")]
    VerifyAlgo(String),

    #[error("VEOHistory.xml is missing from {0}")]
    HistoryMissing(String),

    #[error("VEOHistory.xml is malformed: closing root element not found")]
    HistoryMalformed,

    #[error("history file I/O error: {0}")]
    HistoryIo(String),

    #[error("engine configuration error: {0}")]
    EngineConfig(String),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("{0}")]
    Other(String),
}

impl ResignError {
    /// Whether this error kind aborts the whole batch (spec §7) rather
    /// than just the VEO currently being processed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ResignError::CredentialLoad(_)
                | ResignError::CredentialEmpty
                | ResignError::EngineConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ResignError>;

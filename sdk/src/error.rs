use std::io;

/// Everything that can end an upload attempt.
///
/// Errors of every pipeline stage reach the caller unchanged. None of them is
/// retried inside the pipeline; a retry means a fresh attempt.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("source is empty, refusing to upload a zero-length object")]
    EmptySource,

    #[error("failed to read source stream")]
    StreamRead(#[source] io::Error),

    #[error("invalid cipher context: {0}")]
    CipherContext(String),

    #[error("failed to resolve upload target: {0}")]
    TargetResolution(String),

    #[error("storage endpoint response is missing the content fingerprint (ETag header)")]
    MissingFingerprint,

    #[error("transfer failed")]
    Transfer(#[source] reqwest::Error),

    #[error("transfer aborted")]
    Aborted,
}

impl UploadError {
    /// Cancellation is expected behavior, so callers usually report it differently.
    #[must_use]
    #[inline]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

use std::io;

/// Errors produced while probing media metadata.
///
/// Only `UtilityMissing` ever reaches a caller of the service; everything
/// else is absorbed into default metadata by `MetadataService`.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// No format signature matched the byte prefix.
    #[error("unrecognized image format")]
    UnrecognizedFormat,

    /// A signature matched but the header structure could not be parsed.
    #[error("malformed {0} header")]
    MalformedHeader(&'static str),

    /// ffprobe is not installed on this host. This is a deployment defect,
    /// not a per-request failure.
    #[error("ffprobe was not found on this host; install ffmpeg to enable video probing")]
    UtilityMissing,

    /// ffprobe ran but produced error output or an unusable report.
    #[error("ffprobe failed: {0}")]
    UtilityFailure(String),

    /// A local file or subprocess could not be read.
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),

    /// A remote stream could not be opened or read.
    #[error("http transport failure: {0}")]
    Http(#[from] reqwest::Error),
}

use std::io;

use failure::Fail;

pub type Result<T> = ::std::result::Result<T, Error>;

/// The error taxonomy for the detector. Interval- and run-level failures are
/// recovered locally and never surface as this type; every variant here is
/// something a caller (collection or monitoring session) has to decide how
/// to react to.
#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "configuration unavailable or malformed: {}", inner)]
    ConfigUnavailable { inner: String },

    #[fail(display = "baseline missing for {}: {}", what, inner)]
    BaselineMissing { what: String, inner: String },

    #[fail(display = "application not executable: {}", path)]
    AppNotExecutable { path: String },

    #[fail(display = "sample source produced no samples: {}", inner)]
    SampleSourceFailure { inner: String },

    #[fail(
        display = "insufficient samples for {}: collected {} < required {}",
        app, collected, required
    )]
    InsufficientSamples {
        app: String,
        collected: usize,
        required: usize,
    },

    #[fail(display = "could not persist profile to {}: {}", path, inner)]
    ProfilePersistenceError { path: String, inner: String },

    #[fail(display = "could not append alert: {}", inner)]
    AlertSinkError { inner: String },

    #[fail(display = "I/O error: {}", inner)]
    Io { inner: io::Error },

    #[fail(display = "JSON error: {}", inner)]
    Json { inner: serde_json::Error },
}

impl From<io::Error> for Error {
    fn from(inner: io::Error) -> Self {
        Error::Io { inner }
    }
}

impl From<serde_json::Error> for Error {
    fn from(inner: serde_json::Error) -> Self {
        Error::Json { inner }
    }
}

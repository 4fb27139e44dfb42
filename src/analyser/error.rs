//! Error kinds for reading local inputs and decoding captures.
//!
//! These are kept apart from the classification service errors in `client` so that a
//! caller can always tell "could not read local input" from "the service said no".
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("unsupported format for {path}: expected {expected}")]
    Unsupported { path: PathBuf, expected: &'static str },

    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse delimited table {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("could not parse JSON table {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed table {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("could not write {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum CaptureError {
    /// No packet decoder was supplied, i.e. `tshark` was not found at startup.
    #[error("packet capture decoding is not available (is tshark installed and on PATH?)")]
    DecoderUnavailable,

    #[error("could not start capture decoder for {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed reading packets from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Input(#[from] InputError),
}

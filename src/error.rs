// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::codec::{DecodeError, EncodeError};

/// Represents errors that can occur while operating a store.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// The data directory is held by another open store handle
    DirectoryLocked,

    /// The data directory could not be listed
    DirectoryUnreadable(std::io::Error),

    /// A segment file could not be opened
    SegmentOpenFailed(std::io::Error),

    /// Writing a record failed
    Encode(EncodeError),

    /// Reading a record failed
    Decode(DecodeError),

    /// `Remove` was called on a key that is not present
    RemoveMissing,

    /// An operation was attempted on a segment that has already been closed
    ReadAfterClose,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::DirectoryLocked => write!(f, "data directory is locked by another instance"),
            Self::DirectoryUnreadable(e) => write!(f, "cannot read data directory: {e}"),
            Self::SegmentOpenFailed(e) => write!(f, "cannot open segment file: {e}"),
            Self::Encode(e) => write!(f, "failed to encode record: {e:?}"),
            Self::Decode(e) => write!(f, "failed to decode record: {e:?}"),
            Self::RemoveMissing => write!(f, "key not found"),
            Self::ReadAfterClose => write!(f, "segment is closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::DirectoryUnreadable(e) | Self::SegmentOpenFailed(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            Self::DirectoryLocked | Self::RemoveMissing | Self::ReadAfterClose => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// Store result
pub type Result<T> = std::result::Result<T, Error>;

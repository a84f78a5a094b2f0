// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A durable, embeddable key-value store in the Bitcask style.
//!
//! Keys and values are appended to a log of fixed-header records; an in-memory keydir maps
//! every live key straight to the byte range of its most recent record. A background compactor
//! periodically removes segment files that no longer hold any live data.
//!
//! # Example usage
//!
//! ```
//! use bitcask_kv::Store;
//!
//! # fn main() -> bitcask_kv::Result<()> {
//! # let folder = tempfile::tempdir()?;
//! # let path = folder.path();
//! let store = Store::open(path)?;
//!
//! store.set(b"entry", b"exit")?;
//! assert_eq!(store.get(b"entry")?, Some(b"exit".to_vec()));
//!
//! store.remove(b"entry")?;
//! assert_eq!(store.get(b"entry")?, None);
//! #
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::multiple_crate_versions)]

mod codec;
mod compactor;
mod config;
mod engine;
mod error;
mod id;
mod keydir;
mod segment;
mod store;

pub use {
    compactor::CompactionPolicy,
    config::Config,
    error::{Error, Result},
    keydir::KeydirEntry,
    store::Store,
};

#[doc(hidden)]
pub use id::SegmentId;

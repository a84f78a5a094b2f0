// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::reader::Reader;
use crate::{codec, id::SegmentId};
use memmap2::{Advice, Mmap};
use std::{fs::File, path::Path};

/// An immutable, sealed segment file, mapped read-only into memory.
pub struct SealedSegment {
    pub(crate) id: SegmentId,
    mmap: Mmap,
}

impl SealedSegment {
    /// Opens and memory-maps the sealed segment at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file cannot be opened or mapped.
    pub fn open(path: &Path, id: SegmentId) -> crate::Result<Self> {
        let file = File::open(path).map_err(crate::Error::SegmentOpenFailed)?;

        // SAFETY: the mapped file is only ever written to by this process, while it is still the
        // active segment; once sealed it is never opened for writing again, so concurrent
        // mutation of the backing file cannot happen behind the mapping's back.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file) }.map_err(crate::Error::SegmentOpenFailed)?;

        let _ = mmap.advise(Advice::Sequential);
        let _ = mmap.advise(Advice::WillNeed);

        Ok(Self { id, mmap })
    }

    /// Segment id.
    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Reads the record at `(offset, length)` directly out of the mapping.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the record is malformed or out of bounds.
    pub fn read_at(&self, offset: u64, length: u64) -> crate::Result<(Vec<u8>, Vec<u8>)> {
        codec::decode_at(&self.mmap, offset, length).map_err(Into::into)
    }

    /// Replays every record in the segment, in file order.
    #[must_use]
    pub fn read_all(&self) -> Reader<&[u8]> {
        Reader::new(&self.mmap[..])
    }
}

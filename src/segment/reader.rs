// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::codec;
use std::io::Read;

/// Sequentially decodes every record out of a byte stream, tracking the offset each record
/// started at. Used to rebuild keydir entries when replaying a segment from scratch.
pub struct Reader<R: Read> {
    inner: R,
    offset: u64,
    is_terminated: bool,
}

impl<R: Read> Reader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            offset: 0,
            is_terminated: false,
        }
    }
}

/// One decoded record: key, value, the offset its header started at, and its total frame length.
pub type ReplayedRecord = (Vec<u8>, Vec<u8>, u64, u64);

impl<R: Read> Iterator for Reader<R> {
    type Item = crate::Result<ReplayedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_terminated {
            return None;
        }

        let start_offset = self.offset;

        match codec::decode_next(&mut self.inner) {
            Ok((key, value, consumed)) => {
                self.offset += consumed;
                Some(Ok((key, value, start_offset, consumed)))
            }
            Err(codec::DecodeError::EndOfStream) => {
                self.is_terminated = true;
                None
            }
            Err(e) => {
                self.is_terminated = true;
                Some(Err(e.into()))
            }
        }
    }
}

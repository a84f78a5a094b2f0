// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{reader::Reader, sealed::SealedSegment};
use crate::{
    codec,
    id::{sealed_segment_name, SegmentId, ACTIVE_SEGMENT_NAME},
    keydir::KeydirEntry,
};
use std::{
    fs::{File, OpenOptions},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

#[cfg(unix)]
fn positional_read(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
    std::os::unix::fs::FileExt::read_exact_at(file, buf, offset)
}

#[cfg(windows)]
fn positional_read(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
    let mut read = 0;
    while read < buf.len() {
        // NOTE: Truncation is fine; reads are bounded by segment/record sizes in practice
        #[allow(clippy::cast_possible_truncation)]
        let n = std::os::windows::fs::FileExt::seek_read(file, &mut buf[read..], offset + read as u64)?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        read += n;
    }
    Ok(())
}

/// The one segment currently open for append. Owns a buffered append handle and a separate
/// positional-read handle onto the same file.
pub struct ActiveSegment {
    pub(crate) id: SegmentId,
    path: PathBuf,
    writer: BufWriter<File>,
    reader: File,
    size: u64,
}

impl ActiveSegment {
    /// Opens (creating if necessary) the active segment at `dir`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file cannot be created or opened.
    pub fn open(dir: &Path, id: SegmentId) -> crate::Result<Self> {
        let path = dir.join(ACTIVE_SEGMENT_NAME);

        let write_handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(crate::Error::SegmentOpenFailed)?;

        let size = write_handle.metadata()?.len();

        let reader = File::open(&path).map_err(crate::Error::SegmentOpenFailed)?;

        log::debug!("opened active segment {id} at {}", path.display());

        Ok(Self {
            id,
            path,
            writer: BufWriter::new(write_handle),
            reader,
            size,
        })
    }

    /// Segment id.
    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Current size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Appends `(key, value)`, returning the keydir entry pointing at the new record.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the write fails.
    pub fn write(&mut self, key: &[u8], value: &[u8]) -> crate::Result<KeydirEntry> {
        let offset = self.size;
        let frame_length = codec::encode(&mut self.writer, key, value)?;
        self.size += frame_length;

        log::trace!(
            "appended {} byte record to segment {} at offset {offset}",
            frame_length,
            self.id
        );

        Ok(KeydirEntry {
            segment_id: self.id,
            offset,
            frame_length,
        })
    }

    /// Reads the record at `(offset, length)` via a positional read that does not disturb any
    /// other reader's position on the same file, so concurrent shared reads are race-free.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the read fails or the record is malformed.
    pub fn read_at(&self, offset: u64, length: u64) -> crate::Result<(Vec<u8>, Vec<u8>)> {
        let mut buf = vec![0_u8; length as usize];
        positional_read(&self.reader, offset, &mut buf)?;

        let mut cursor = buf.as_slice();
        let (key, value, _) = codec::decode_next(&mut cursor)?;
        Ok((key, value))
    }

    /// Replays every record currently in the segment, in file order.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the segment cannot be reopened or a record is malformed.
    pub fn read_all(&self) -> crate::Result<Reader<BufReader<File>>> {
        let file = File::open(&self.path).map_err(crate::Error::SegmentOpenFailed)?;
        Ok(Reader::new(BufReader::new(file)))
    }

    /// Seals the segment: flushes and fsyncs, renames to its final `segment_NNNNN.dat` name,
    /// then reopens it read-only and memory-maps it.
    ///
    /// # Errors
    ///
    /// Returns `Err` if any step of sealing fails.
    pub fn rotate(mut self) -> crate::Result<SealedSegment> {
        self.writer.flush()?;
        self.writer.get_mut().sync_all()?;
        drop(self.writer);
        drop(self.reader);

        let sealed_path = self
            .path
            .parent()
            .expect("active segment path has a parent")
            .join(sealed_segment_name(self.id));

        std::fs::rename(&self.path, &sealed_path)?;

        log::debug!("sealed segment {} as {}", self.id, sealed_path.display());

        SealedSegment::open(&sealed_path, self.id)
    }

    /// Flushes and fsyncs without sealing. Used on close of a still-active segment.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the flush or sync fails.
    pub fn flush(&mut self) -> crate::Result<()> {
        self.writer.flush()?;
        self.writer.get_mut().sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    #[allow(clippy::expect_used)]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut segment = ActiveSegment::open(dir.path(), 1).expect("open");

        let entry = segment.write(b"key", b"value").expect("write");
        assert_eq!(entry.segment_id, 1);
        assert_eq!(entry.offset, 0);

        let (key, value) = segment
            .read_at(entry.offset, entry.frame_length)
            .expect("read");
        assert_eq!(key, b"key");
        assert_eq!(value, b"value");
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn size_grows_by_frame_length() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut segment = ActiveSegment::open(dir.path(), 1).expect("open");

        assert_eq!(segment.size(), 0);
        let entry = segment.write(b"k", b"v").expect("write");
        assert_eq!(segment.size(), entry.frame_length);
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn reopening_preexisting_active_segment_resumes_size() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let mut segment = ActiveSegment::open(dir.path(), 1).expect("open");
            segment.write(b"k", b"v").expect("write");
        }

        let segment = ActiveSegment::open(dir.path(), 1).expect("reopen");
        assert!(segment.size() > 0);
    }
}

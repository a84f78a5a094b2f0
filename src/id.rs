// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Segment identifiers and the file-naming convention that carries them.

use std::path::Path;

/// Identifies a segment, unique within a store's lifetime.
#[allow(clippy::module_name_repetitions)]
pub type SegmentId = u64;

/// Name of the active (currently appended-to) segment file.
pub const ACTIVE_SEGMENT_NAME: &str = "current_segment.dat";

/// Name of the advisory lock file held for the lifetime of an open store.
pub const LOCK_FILE_NAME: &str = ".locked";

/// Formats a sealed segment's file name from its id, e.g. `segment_00001.dat`.
#[must_use]
pub fn sealed_segment_name(id: SegmentId) -> String {
    format!("segment_{id:05}.dat")
}

/// Parses a sealed segment id out of a file name of the shape `segment_NNNNN.dat`.
///
/// Returns `None` for any other file name, including the active segment's.
#[must_use]
pub fn parse_sealed_segment_id(file_name: &str) -> Option<SegmentId> {
    let digits = file_name.strip_prefix("segment_")?.strip_suffix(".dat")?;
    digits.parse::<SegmentId>().ok()
}

/// `true` if `path`'s file name is the active segment's reserved name.
#[must_use]
pub fn is_active_segment_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name == ACTIVE_SEGMENT_NAME)
}

/// Determines the id a freshly created active segment should take: one past the highest sealed
/// segment id present in `dir`, or `1` if none exist.
///
/// # Errors
///
/// Returns `Err` if `dir` cannot be listed.
pub fn next_active_segment_id(dir: &Path) -> std::io::Result<SegmentId> {
    let mut max_id = 0;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };

        if let Some(id) = parse_sealed_segment_id(&name) {
            max_id = max_id.max(id);
        }
    }

    Ok(max_id + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn formats_zero_padded_name() {
        assert_eq!(sealed_segment_name(15), "segment_00015.dat");
        assert_eq!(sealed_segment_name(2), "segment_00002.dat");
    }

    #[test]
    fn parses_sealed_segment_id() {
        assert_eq!(parse_sealed_segment_id("segment_00015.dat"), Some(15));
        assert_eq!(parse_sealed_segment_id("segment_00002.dat"), Some(2));
        assert_eq!(parse_sealed_segment_id("current_segment.dat"), None);
        assert_eq!(parse_sealed_segment_id(".locked"), None);
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn next_active_id_starts_at_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(next_active_segment_id(dir.path()).expect("ok"), 1);
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn next_active_id_follows_highest_sealed() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(sealed_segment_name(1)), []).expect("write");
        std::fs::write(dir.path().join(sealed_segment_name(3)), []).expect("write");
        assert_eq!(next_active_segment_id(dir.path()).expect("ok"), 4);
    }
}

//! Modification-time bookkeeping between a file and its counterpart.
//!
//! Every write into the opposite tree copies the input's mtime onto the output.
//! The peer session then sees an output that is not newer than its counterpart
//! and leaves it alone, which is what stops a mirrored write from bouncing back.

use std::io;
use std::path::Path;

use filetime::{FileTime, set_file_mtime};

/// Whether `input` should overwrite `output`.
///
/// True when `input` exists and `output` is missing or strictly older.
pub fn is_newer(input: &Path, output: &Path) -> io::Result<bool> {
    let input_meta = match std::fs::metadata(input) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let output_meta = match std::fs::metadata(output) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    };

    Ok(FileTime::from_last_modification_time(&input_meta)
        > FileTime::from_last_modification_time(&output_meta))
}

/// Copy `input`'s modification time onto `output`.
pub fn mirror_modification_time(input: &Path, output: &Path) -> io::Result<()> {
    let input_meta = std::fs::metadata(input)?;
    set_file_mtime(output, FileTime::from_last_modification_time(&input_meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_output_is_older() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        std::fs::write(&input, b"x").unwrap();
        assert!(is_newer(&input, &dir.path().join("out")).unwrap());
    }

    #[test]
    fn test_missing_input_is_never_newer() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out");
        std::fs::write(&output, b"x").unwrap();
        assert!(!is_newer(&dir.path().join("in"), &output).unwrap());
    }

    #[test]
    fn test_mirrored_times_are_not_newer() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        std::fs::write(&input, b"x").unwrap();
        std::fs::write(&output, b"y").unwrap();
        set_file_mtime(&input, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();

        mirror_modification_time(&input, &output).unwrap();
        assert!(!is_newer(&input, &output).unwrap());
        assert!(!is_newer(&output, &input).unwrap());
    }

    #[test]
    fn test_strictly_newer_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        std::fs::write(&input, b"x").unwrap();
        std::fs::write(&output, b"y").unwrap();
        set_file_mtime(&output, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
        set_file_mtime(&input, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
        assert!(is_newer(&input, &output).unwrap());
    }
}

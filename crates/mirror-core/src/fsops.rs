//! Filesystem primitives used by the reconciler.

use crate::error::{Result, SyncError};
use crate::tree::{EntryKind, TreePath};
use filetime::FileTime;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

const COMPARE_CHUNK: usize = 64 * 1024;

/// Counts from copying a whole subtree.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyStats {
    pub dirs: usize,
    pub files: usize,
    pub errors: usize,
}

/// Copies a file and carries over permissions and access/modification times.
///
/// Timestamps are best-effort: failing to set them is logged, not returned.
pub fn copy_file_preserving(src: &Path, dst: &Path) -> Result<u64> {
    let bytes = fs::copy(src, dst).map_err(|e| SyncError::io("copy file", src, e))?;

    match fs::metadata(src) {
        Ok(meta) => {
            let atime = FileTime::from_last_access_time(&meta);
            let mtime = FileTime::from_last_modification_time(&meta);
            if let Err(e) = filetime::set_file_times(dst, atime, mtime) {
                warn!("Could not preserve timestamps on {}: {}", dst.display(), e);
            }
        }
        Err(e) => warn!("Could not read metadata of {}: {}", src.display(), e),
    }

    Ok(bytes)
}

/// Overwrites `dst` with the contents of `src`.
pub fn overwrite_file(src: &Path, dst: &Path) -> Result<u64> {
    fs::copy(src, dst).map_err(|e| SyncError::io("overwrite file", dst, e))
}

/// Recursively copies the directory `src` to `dst` in one step.
///
/// Entries that fail are logged and counted; the rest of the subtree is
/// still copied.
pub fn copy_dir_recursive(src: &Path, dst: &Path, follow_links: bool) -> CopyStats {
    let mut stats = CopyStats::default();

    let walker = WalkDir::new(src)
        .follow_links(follow_links)
        .sort_by_file_name();

    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", src.display(), e);
                stats.errors += 1;
                continue;
            }
        };

        let outcome = TreePath::relative_to(src, entry.path()).and_then(|rel| {
            let target = rel.resolve(dst);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)
                    .map_err(|e| SyncError::io("create directory", &target, e))?;
                stats.dirs += 1;
            } else {
                copy_file_preserving(entry.path(), &target)?;
                stats.files += 1;
            }
            Ok(())
        });

        if let Err(e) = outcome {
            warn!("{}", e);
            stats.errors += 1;
        }
    }

    debug!(
        "Copied {} -> {} ({} dirs, {} files)",
        src.display(),
        dst.display(),
        stats.dirs,
        stats.files
    );
    stats
}

/// Compares two files byte for byte.
pub fn files_identical(a: &Path, b: &Path) -> Result<bool> {
    let len_a = fs::metadata(a).map_err(|e| SyncError::io("stat", a, e))?.len();
    let len_b = fs::metadata(b).map_err(|e| SyncError::io("stat", b, e))?.len();
    if len_a != len_b {
        return Ok(false);
    }

    let file_a = File::open(a).map_err(|e| SyncError::io("open", a, e))?;
    let file_b = File::open(b).map_err(|e| SyncError::io("open", b, e))?;
    let mut reader_a = BufReader::new(file_a);
    let mut reader_b = BufReader::new(file_b);
    let mut buf_a = vec![0u8; COMPARE_CHUNK];
    let mut buf_b = vec![0u8; COMPARE_CHUNK];

    loop {
        let n_a = read_chunk(&mut reader_a, &mut buf_a).map_err(|e| SyncError::io("read", a, e))?;
        let n_b = read_chunk(&mut reader_b, &mut buf_b).map_err(|e| SyncError::io("read", b, e))?;
        if n_a != n_b || buf_a[..n_a] != buf_b[..n_b] {
            return Ok(false);
        }
        if n_a == 0 {
            return Ok(true);
        }
    }
}

// Fills `buf` unless EOF comes first.
fn read_chunk(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Removes whatever is at `path`, recursively for directories.
pub fn remove_entry(path: &Path, kind: EntryKind) -> Result<()> {
    if kind.is_dir() {
        fs::remove_dir_all(path).map_err(|e| SyncError::io("delete directory", path, e))
    } else {
        fs::remove_file(path).map_err(|e| SyncError::io("delete file", path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_copy_preserves_mtime() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        fs::write(&src, b"hello").unwrap();
        let old = FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(&src, old).unwrap();

        copy_file_preserving(&src, &dst).unwrap();

        let meta = fs::metadata(&dst).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), old);
        assert_eq!(fs::read(&dst).unwrap(), b"hello");
    }

    #[test]
    fn test_files_identical() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let c = dir.path().join("c");
        fs::write(&a, b"same bytes").unwrap();
        fs::write(&b, b"same bytes").unwrap();
        fs::write(&c, b"same bytez").unwrap();

        assert!(files_identical(&a, &b).unwrap());
        assert!(!files_identical(&a, &c).unwrap());
    }

    #[test]
    fn test_files_identical_across_chunks() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let mut data = vec![7u8; COMPARE_CHUNK * 2 + 10];
        fs::write(&a, &data).unwrap();
        *data.last_mut().unwrap() = 8;
        fs::write(&b, &data).unwrap();

        assert!(!files_identical(&a, &b).unwrap());
    }

    #[test]
    fn test_copy_dir_recursive() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("x/y")).unwrap();
        fs::write(src.join("x/one.txt"), b"1").unwrap();
        fs::write(src.join("x/y/two.txt"), b"2").unwrap();

        let dst = dir.path().join("dst");
        let stats = copy_dir_recursive(&src, &dst, false);

        assert_eq!(stats, CopyStats { dirs: 3, files: 2, errors: 0 });
        assert_eq!(fs::read(dst.join("x/one.txt")).unwrap(), b"1");
        assert_eq!(fs::read(dst.join("x/y/two.txt")).unwrap(), b"2");
    }

    #[test]
    fn test_remove_entry() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir_all(sub.join("deep")).unwrap();
        fs::write(sub.join("deep/f"), b"x").unwrap();

        remove_entry(&sub, EntryKind::Directory).unwrap();
        assert!(!sub.exists());
    }
}

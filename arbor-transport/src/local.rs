use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use arbor_errors::{Error, Result};
use arbor_lock::{AtomicFile, ReadLock, WriteLock};

use crate::{ByteRange, Stat, Transport};

/// A [`Transport`] rooted at a directory on the local filesystem.
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalTransport { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn io_err(path: &Path, e: std::io::Error) -> Error {
        match e.kind() {
            std::io::ErrorKind::NotFound => Error::NoSuchFile(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::AlreadyExists => Error::FileExists(path.to_path_buf()),
            _ => Error::Io(e),
        }
    }
}

impl Transport for LocalTransport {
    fn get(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        fs::read(&full).map_err(|e| Self::io_err(&full, e))
    }

    fn get_range(&self, path: &str, ranges: &[ByteRange]) -> Result<Vec<Vec<u8>>> {
        let full = self.resolve(path);
        let mut file = fs::File::open(&full).map_err(|e| Self::io_err(&full, e))?;
        let mut out = Vec::with_capacity(ranges.len());
        for range in ranges {
            file.seek(SeekFrom::Start(range.offset))
                .map_err(Error::Io)?;
            let mut buf = vec![0u8; range.length as usize];
            file.read_exact(&mut buf).map_err(Error::Io)?;
            out.push(buf);
        }
        Ok(out)
    }

    fn put(&self, path: &str, contents: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        let mut atomic = AtomicFile::new(&full)?;
        atomic.write_all(contents).map_err(Error::Io)?;
        atomic.commit()
    }

    fn append(&self, path: &str, contents: &[u8]) -> Result<u64> {
        let full = self.resolve(path);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .map_err(|e| Self::io_err(&full, e))?;
        let offset = file.metadata().map_err(Error::Io)?.len();
        file.write_all(contents).map_err(Error::Io)?;
        Ok(offset)
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        fs::create_dir(&full).map_err(|e| Self::io_err(&full, e))
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from_full = self.resolve(from);
        let to_full = self.resolve(to);
        fs::rename(&from_full, &to_full).map_err(|e| Self::io_err(&from_full, e))
    }

    fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        fs::remove_file(&full).map_err(|e| Self::io_err(&full, e))
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        let full = self.resolve(path);
        let mut names = Vec::new();
        for entry in fs::read_dir(&full).map_err(|e| Self::io_err(&full, e))? {
            let entry = entry.map_err(Error::Io)?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn stat(&self, path: &str) -> Result<Stat> {
        let full = self.resolve(path);
        let meta = fs::metadata(&full).map_err(|e| Self::io_err(&full, e))?;
        Ok(Stat {
            size: meta.len(),
            is_dir: meta.is_dir(),
        })
    }

    fn has(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn clone_transport(&self, relpath: &str) -> Box<dyn Transport> {
        Box::new(LocalTransport::new(self.resolve(relpath)))
    }

    fn abspath(&self, relpath: &str) -> String {
        self.resolve(relpath).to_string_lossy().into_owned()
    }

    fn lock_read(&self, path: &str) -> Result<ReadLock> {
        ReadLock::acquire(self.resolve(path))
    }

    fn lock_write(&self, path: &str) -> Result<WriteLock> {
        WriteLock::acquire(self.resolve(path), "local-transport")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let t = LocalTransport::new(dir.path());
        t.put("a.txt", b"hello").unwrap();
        assert_eq!(t.get("a.txt").unwrap(), b"hello");
    }

    #[test]
    fn append_returns_prior_length() {
        let dir = tempfile::tempdir().unwrap();
        let t = LocalTransport::new(dir.path());
        t.put("a.txt", b"hello").unwrap();
        let offset = t.append("a.txt", b" world").unwrap();
        assert_eq!(offset, 5);
        assert_eq!(t.get("a.txt").unwrap(), b"hello world");
    }

    #[test]
    fn get_range_slices_requested_spans() {
        let dir = tempfile::tempdir().unwrap();
        let t = LocalTransport::new(dir.path());
        t.put("a.txt", b"0123456789").unwrap();
        let parts = t
            .get_range(
                "a.txt",
                &[
                    ByteRange { offset: 0, length: 3 },
                    ByteRange { offset: 5, length: 2 },
                ],
            )
            .unwrap();
        assert_eq!(parts[0], b"012");
        assert_eq!(parts[1], b"56");
    }

    #[test]
    fn has_reflects_existence() {
        let dir = tempfile::tempdir().unwrap();
        let t = LocalTransport::new(dir.path());
        assert!(!t.has("a.txt"));
        t.put("a.txt", b"x").unwrap();
        assert!(t.has("a.txt"));
    }

    #[test]
    fn missing_file_maps_to_no_such_file() {
        let dir = tempfile::tempdir().unwrap();
        let t = LocalTransport::new(dir.path());
        match t.get("missing.txt") {
            Err(Error::NoSuchFile(_)) => {}
            other => panic!("expected NoSuchFile, got {other:?}"),
        }
    }
}

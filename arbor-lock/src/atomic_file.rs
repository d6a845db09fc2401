use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use arbor_errors::{Error, Result};

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// A file that moves into place with an atomic rename on [`commit`](AtomicFile::commit).
///
/// Writes go to `<target>.<pid>.<hostname>.tmp`; `commit()` closes that file,
/// copies permissions from the existing target (or applies a caller-supplied
/// mode), and renames it over the target. The rename breaks any hardlinks to
/// the previous target since it replaces the inode rather than editing it in
/// place. If neither `commit()` nor `abort()` is called, `Drop` aborts and
/// best-effort removes the temp file, the way a context-managed resource
/// cleans up on an exceptional exit path.
pub struct AtomicFile {
    tmp_path: PathBuf,
    target_path: PathBuf,
    file: Option<File>,
    new_mode: Option<u32>,
}

impl AtomicFile {
    pub fn new(target: impl AsRef<Path>) -> Result<Self> {
        Self::with_mode(target, None)
    }

    pub fn with_mode(target: impl AsRef<Path>, new_mode: Option<u32>) -> Result<Self> {
        let target_path = target.as_ref().to_path_buf();
        let tmp_path = PathBuf::from(format!(
            "{}.{}.{}.tmp",
            target_path.display(),
            std::process::id(),
            hostname()
        ));
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        Ok(AtomicFile {
            tmp_path,
            target_path,
            file: Some(file),
            new_mode,
        })
    }

    /// Closes the temp file and renames it over the target. Consumes `self`
    /// so a double-commit is a compile error rather than a runtime one.
    pub fn commit(mut self) -> Result<()> {
        self.finish_write()?;
        self.apply_mode()?;
        fs::rename(&self.tmp_path, &self.target_path).map_err(|e| {
            let _ = fs::remove_file(&self.tmp_path);
            Error::Io(e)
        })?;
        Ok(())
    }

    /// Discards the temp file without touching the target.
    pub fn abort(mut self) -> Result<()> {
        self.finish_write()?;
        fs::remove_file(&self.tmp_path)?;
        Ok(())
    }

    fn finish_write(&mut self) -> Result<()> {
        if let Some(mut f) = self.file.take() {
            f.flush()?;
        }
        Ok(())
    }

    fn apply_mode(&self) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = match self.new_mode {
                Some(m) => Some(m),
                None => match fs::symlink_metadata(&self.target_path) {
                    Ok(meta) => Some(meta.permissions().mode()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                    Err(e) => return Err(Error::Io(e)),
                },
            };
            if let Some(mode) = mode {
                fs::set_permissions(&self.tmp_path, fs::Permissions::from_mode(mode))?;
            }
        }
        Ok(())
    }

    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file
            .as_mut()
            .expect("write called on a closed AtomicFile")
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file
            .as_mut()
            .expect("flush called on a closed AtomicFile")
            .flush()
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        if self.file.is_some() {
            self.file = None;
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

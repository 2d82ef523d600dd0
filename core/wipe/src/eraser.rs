//! Multi-pass overwrite followed by removal.

use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rand::RngCore;
use tracing::{debug, info, warn};

use crate::confirm::Confirmation;
use chap_common::{Error, Result};

/// Default number of overwrite passes.
pub const DEFAULT_PASSES: u32 = 10;

/// Bytes written per call while overwriting (64 KiB).
pub const WIPE_BLOCK_SIZE: usize = 64 * 1024;

/// Something a wipe pass can overwrite and force to storage.
pub trait PassTarget: Write + Seek {
    /// Block until everything written so far is on the storage device.
    fn sync(&mut self) -> io::Result<()>;

    /// Current length in bytes.
    fn size(&mut self) -> io::Result<u64> {
        self.seek(SeekFrom::End(0))
    }
}

impl PassTarget for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl<T: PassTarget + ?Sized> PassTarget for &mut T {
    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }

    fn size(&mut self) -> io::Result<u64> {
        (**self).size()
    }
}

/// Summary of a completed wipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WipeReport {
    /// Path that was removed.
    pub path: PathBuf,
    /// Overwrite passes performed.
    pub passes: u32,
    /// Bytes overwritten per pass.
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fill {
    Random,
    Zeros,
}

/// Overwrites and removes single files.
#[derive(Debug, Clone)]
pub struct Eraser {
    passes: u32,
}

impl Eraser {
    /// Create an eraser performing `passes` overwrites.
    pub fn new(passes: u32) -> Self {
        Self { passes }
    }

    /// Number of overwrite passes.
    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Wipe the regular file at `path`.
    ///
    /// # Postconditions
    /// - On success the path no longer exists and its bytes were
    ///   overwritten `passes` times, each pass synced before the next
    /// - Only the file that was confirmed is written to; if the path was
    ///   replaced while waiting for confirmation nothing is overwritten
    ///
    /// # Errors
    /// - `InvalidInput` if `passes` is zero, `path` is not a regular file, or
    ///   `path` no longer names the confirmed file
    /// - `NotFound` if `path` does not exist
    /// - `Cancelled` if `confirmation` declines; the file is untouched
    /// - `Io` if a pass fails; the file is left in place, partially overwritten
    pub fn wipe(&self, path: &Path, confirmation: &mut dyn Confirmation) -> Result<WipeReport> {
        self.wipe_with(path, confirmation, open_confirmed)
    }

    /// [`Eraser::wipe`] with a caller-provided way to open the target.
    ///
    /// `open` receives the metadata of the file that was confirmed.
    pub fn wipe_with<T, F>(
        &self,
        path: &Path,
        confirmation: &mut dyn Confirmation,
        open: F,
    ) -> Result<WipeReport>
    where
        T: PassTarget,
        F: FnOnce(&Path, &Metadata) -> Result<T>,
    {
        if self.passes == 0 {
            return Err(Error::InvalidInput(
                "Pass count must be at least 1".to_string(),
            ));
        }

        let confirmed = regular_file_metadata(path)?;

        if !confirmation.confirm(path)? {
            warn!(path = %path.display(), "Wipe cancelled");
            return Err(Error::Cancelled);
        }

        // The prompt may have waited a while.
        let current = regular_file_metadata(path)?;
        if !same_file(&confirmed, &current) {
            return Err(replaced(path));
        }
        let mut target = open(path, &current)?;
        let len = target.size()?;

        for pass in 1..=self.passes {
            let fill = if pass == self.passes {
                Fill::Zeros
            } else {
                Fill::Random
            };
            if let Err(e) = overwrite_pass(&mut target, len, fill) {
                warn!(path = %path.display(), pass, "Wipe pass failed, file left in place");
                return Err(e.into());
            }
            debug!(pass, passes = self.passes, bytes = len, "Wipe pass synced");
        }
        drop(target);

        fs::remove_file(path).map_err(|e| io_error(path, e))?;
        info!(path = %path.display(), passes = self.passes, bytes = len, "File wiped");

        Ok(WipeReport {
            path: path.to_path_buf(),
            passes: self.passes,
            bytes: len,
        })
    }
}

impl Default for Eraser {
    fn default() -> Self {
        Self::new(DEFAULT_PASSES)
    }
}

fn io_error(path: &Path, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        Error::NotFound(path.to_path_buf())
    } else {
        e.into()
    }
}

fn replaced(path: &Path) -> Error {
    Error::InvalidInput(format!(
        "{} was replaced while waiting for confirmation",
        path.display()
    ))
}

/// Metadata of `path` itself, which must be a regular file.
fn regular_file_metadata(path: &Path) -> Result<Metadata> {
    let metadata = fs::symlink_metadata(path).map_err(|e| io_error(path, e))?;
    if !metadata.file_type().is_file() {
        return Err(Error::InvalidInput(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    Ok(metadata)
}

#[cfg(unix)]
fn same_file(a: &Metadata, b: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_file(a: &Metadata, b: &Metadata) -> bool {
    a.len() == b.len() && a.modified().ok() == b.modified().ok()
}

/// Open `path` for writing without following a final symlink, and check
/// that the handle refers to the file described by `expected`.
fn open_confirmed(path: &Path, expected: &Metadata) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.custom_flags(libc::O_NOFOLLOW);
    }

    let file = match options.open(path) {
        Ok(file) => file,
        #[cfg(unix)]
        Err(e) if e.raw_os_error() == Some(libc::ELOOP) => return Err(replaced(path)),
        Err(e) => return Err(io_error(path, e)),
    };

    let opened = file.metadata()?;
    if !opened.file_type().is_file() || !same_file(expected, &opened) {
        return Err(replaced(path));
    }
    Ok(file)
}

/// Overwrite `len` bytes from the start of `target`, then sync.
fn overwrite_pass<T: PassTarget>(target: &mut T, len: u64, fill: Fill) -> io::Result<()> {
    target.seek(SeekFrom::Start(0))?;

    let mut block = vec![0u8; len.min(WIPE_BLOCK_SIZE as u64) as usize];
    let mut rng = rand::thread_rng();
    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(block.len() as u64) as usize;
        if fill == Fill::Random {
            rng.fill_bytes(&mut block[..n]);
        }
        target.write_all(&block[..n])?;
        remaining -= n as u64;
    }

    target.flush()?;
    target.sync()
}

/// Wipe `path` with `passes` overwrites, asking `confirmation` first.
pub fn secure_wipe(
    path: impl AsRef<Path>,
    passes: u32,
    confirmation: &mut dyn Confirmation,
) -> Result<WipeReport> {
    Eraser::new(passes).wipe(path.as_ref(), confirmation)
}

//! On-disk persistence for the long-lived web token.
//!
//! The cache is a plain text file whose first non-blank line is the token. It is created
//! empty on first use and overwritten wholesale on every save.

use std::fs;
use std::io::{BufRead as _, BufReader, Write as _};
use std::path::{Path, PathBuf};

use crate::Result;
use crate::error::Error;

#[cfg(windows)]
const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
const LINE_ENDING: &str = "\n";

/// Handle to the token cache file. Holding one guarantees the file existed when it was opened.
#[derive(Clone, Debug)]
pub struct CacheFile {
    path: PathBuf,
}

impl CacheFile {
    /// Opens the cache file at `path`, creating it (and its parent directories) if needed.
    ///
    /// A regular file sitting where the parent directory should be, or a directory sitting
    /// where the cache file should be, is deleted and replaced.
    pub fn get_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::configuration("cache file path cannot be empty"));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if parent.exists() && !parent.is_dir() {
                fs::remove_file(parent).map_err(|e| Error::cache_file(parent, e))?;
            }
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| Error::cache_file(parent, e))?;
            }
        }

        if path.is_dir() {
            #[cfg(feature = "tracing")]
            tracing::warn!(path = %path.display(), "Replacing directory at cache file location");
            fs::remove_dir_all(path).map_err(|e| Error::cache_file(path, e))?;
        }

        if !path.exists() {
            fs::File::create(path).map_err(|e| Error::cache_file(path, e))?;
            #[cfg(feature = "tracing")]
            tracing::debug!(path = %path.display(), "Created empty token cache");
        }

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the first non-blank line of the file, trimmed, or `None` when there is none.
    pub fn load(&self) -> Result<Option<String>> {
        let file = fs::File::open(&self.path).map_err(|e| Error::cache_file(&self.path, e))?;

        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| Error::cache_file(&self.path, e))?;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_owned()));
            }
        }

        Ok(None)
    }

    /// Truncates the file and writes `value` as its only line.
    pub fn save(&self, value: &str) -> Result<()> {
        let mut file =
            fs::File::create(&self.path).map_err(|e| Error::cache_file(&self.path, e))?;
        write!(file, "{value}{LINE_ENDING}").map_err(|e| Error::cache_file(&self.path, e))?;
        file.flush().map_err(|e| Error::cache_file(&self.path, e))
    }
}

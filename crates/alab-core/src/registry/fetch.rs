//! App sources that are not git repositories.
//!
//! A release may point at a local directory, at a tar (plain or gzipped) or
//! zip archive on disk, or at such an archive served over `https://`.
//! Archives are unpacked into a scratch directory; when an archive holds a
//! single top-level directory, that directory is the app tree.

use std::fs;
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tempfile::TempDir;
use url::Url;

use crate::errors::AppError;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Where a non-git release lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeSource {
    /// `file:` URL or plain path: a directory or an archive.
    Path(PathBuf),
    /// Archive served over `https://`.
    Https(Url),
}

impl TreeSource {
    /// Classify `url` without touching the filesystem or network.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UnsupportedScheme`] for any other scheme.
    pub fn parse(url: &str) -> Result<Self, AppError> {
        match Url::parse(url) {
            Ok(parsed) if parsed.scheme() == "file" => parsed
                .to_file_path()
                .map(TreeSource::Path)
                .map_err(|_| AppError::UnsupportedScheme(url.to_string())),
            Ok(parsed) if parsed.scheme() == "https" => Ok(TreeSource::Https(parsed)),
            Ok(_) => Err(AppError::UnsupportedScheme(url.to_string())),
            Err(_) => Ok(TreeSource::Path(PathBuf::from(url))),
        }
    }

    /// Make the app tree available on disk.
    pub fn fetch(&self) -> Result<SourceTree, AppError> {
        match self {
            TreeSource::Path(path) if path.is_dir() => Ok(SourceTree {
                path: path.clone(),
                _scratch: None,
            }),
            TreeSource::Path(path) => {
                let bytes = fs::read(path).map_err(|e| match e.kind() {
                    ErrorKind::NotFound => AppError::Archive {
                        location: path.display().to_string(),
                        reason: "no such file or directory".to_string(),
                    },
                    _ => AppError::Io(e),
                })?;
                unpack(&bytes, &path.display().to_string())
            }
            TreeSource::Https(url) => {
                tracing::debug!("Downloading {}", url);
                let bytes = reqwest::blocking::get(url.as_str())
                    .and_then(|r| r.error_for_status())
                    .and_then(|r| r.bytes())
                    .map_err(|e| AppError::Archive {
                        location: url.to_string(),
                        reason: e.to_string(),
                    })?;
                unpack(&bytes, url.as_str())
            }
        }
    }
}

/// An app tree on disk; an unpacked archive is removed on drop.
#[derive(Debug)]
pub struct SourceTree {
    path: PathBuf,
    _scratch: Option<TempDir>,
}

impl SourceTree {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn unpack(bytes: &[u8], location: &str) -> Result<SourceTree, AppError> {
    let failed = |reason: String| AppError::Archive {
        location: location.to_string(),
        reason,
    };
    let scratch = TempDir::new()?;
    if bytes.starts_with(ZIP_MAGIC) {
        zip::ZipArchive::new(Cursor::new(bytes))
            .and_then(|mut archive| archive.extract(scratch.path()))
            .map_err(|e| failed(e.to_string()))?;
    } else if bytes.starts_with(GZIP_MAGIC) {
        tar::Archive::new(GzDecoder::new(bytes))
            .unpack(scratch.path())
            .map_err(|e| failed(e.to_string()))?;
    } else {
        tar::Archive::new(bytes)
            .unpack(scratch.path())
            .map_err(|e| failed(e.to_string()))?;
    }

    let members: Vec<PathBuf> = fs::read_dir(scratch.path())?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .collect();
    let path = match members.as_slice() {
        [] => return Err(failed("not a tar or zip archive".to_string())),
        [only] if only.is_dir() => only.clone(),
        _ => scratch.path().to_path_buf(),
    };
    tracing::debug!("Unpacked {} into {}", location, path.display());
    Ok(SourceTree {
        path,
        _scratch: Some(scratch),
    })
}

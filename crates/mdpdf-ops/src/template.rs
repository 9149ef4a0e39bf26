//! Template discovery and bootstrap.
//!
//! The template lives somewhere below the base directory, usually inside a
//! versioned release folder (`eisvogel-3.2.0/eisvogel.latex`). When it is
//! missing the release archive is downloaded and unpacked in place.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use mdpdf_config::TemplateSettings;
use reqwest::blocking::Client;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Prefix of the private directories archives are unpacked into.
pub const STAGING_PREFIX: &str = ".mdpdf-template";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to download template archive from {url}: {source}")]
    Fetch { url: String, source: reqwest::Error },

    #[error("template archive request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("template archive {url} is unavailable: {reason}")]
    Unavailable { url: String, reason: String },

    #[error("failed to extract template archive: {source}")]
    Extract { source: io::Error },

    #[error("{file_name} not found under {} after extraction", base_dir.display())]
    NotFound { base_dir: PathBuf, file_name: String },

    #[error("i/o error on {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Retrieves the raw bytes of a template release archive.
pub trait ArchiveFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TemplateError>;
}

/// Blocking HTTP fetcher with a whole-request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        HttpFetcher { timeout }
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TemplateError> {
        let fetch_error = |source| TemplateError::Fetch {
            url: url.to_string(),
            source,
        };
        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("mdpdf/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(fetch_error)?;
        let response = client.get(url).send().map_err(fetch_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TemplateError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().map_err(fetch_error)?;
        Ok(bytes.to_vec())
    }
}

/// Result of making sure a template is available.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateOutcome {
    pub path: PathBuf,
    pub downloaded: bool,
}

/// Search `base_dir` recursively for files named `file_name`.
///
/// When several match, the one with the greatest relative path under
/// [`compare_versioned`] wins. Staging directories are never searched.
pub fn discover_template(base_dir: &Path, file_name: &str) -> Option<PathBuf> {
    WalkDir::new(base_dir)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_staging_dir(entry.path()))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == file_name)
        .map(|entry| entry.into_path())
        .max_by(|a, b| compare_paths(relative(a, base_dir), relative(b, base_dir)))
}

/// Ensure a template exists under `base_dir`, downloading it when absent.
pub fn ensure_template(
    base_dir: &Path,
    settings: &TemplateSettings,
    fetcher: &dyn ArchiveFetcher,
) -> Result<TemplateOutcome, TemplateError> {
    if let Some(path) = discover_template(base_dir, &settings.file_name) {
        debug!(template = %path.display(), "template found");
        return Ok(TemplateOutcome {
            path,
            downloaded: false,
        });
    }

    info!(url = %settings.archive_url, "template not found, downloading release archive");
    let bytes = fetcher.fetch(&settings.archive_url)?;
    let installed = unpack_into(base_dir, &bytes)?;
    debug!(entries = installed.len(), "template archive unpacked");

    match discover_template(base_dir, &settings.file_name) {
        Some(path) => {
            info!(template = %path.display(), "template installed");
            Ok(TemplateOutcome {
                path,
                downloaded: true,
            })
        }
        None => Err(TemplateError::NotFound {
            base_dir: base_dir.to_path_buf(),
            file_name: settings.file_name.clone(),
        }),
    }
}

/// Unpack a gzip-compressed tarball into `base_dir`.
///
/// Extraction happens in a private directory inside `base_dir`; its top-level
/// entries are then renamed into place. Entries that already exist are left
/// untouched, so concurrent runs never observe a half-written template.
/// Returns the entries this call moved into `base_dir`.
pub fn unpack_into(base_dir: &Path, bytes: &[u8]) -> Result<Vec<PathBuf>, TemplateError> {
    fs::create_dir_all(base_dir).map_err(|source| TemplateError::Io {
        path: base_dir.to_path_buf(),
        source,
    })?;

    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(base_dir)
        .map_err(|source| TemplateError::Io {
            path: base_dir.to_path_buf(),
            source,
        })?;

    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    archive
        .unpack(staging.path())
        .map_err(|source| TemplateError::Extract { source })?;

    let entries = fs::read_dir(staging.path()).map_err(|source| TemplateError::Io {
        path: staging.path().to_path_buf(),
        source,
    })?;

    let mut moved = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| TemplateError::Io {
            path: staging.path().to_path_buf(),
            source,
        })?;
        let target = base_dir.join(entry.file_name());
        if target.symlink_metadata().is_ok() {
            debug!(entry = %target.display(), "keeping existing entry");
            continue;
        }
        match fs::rename(entry.path(), &target) {
            Ok(()) => moved.push(target),
            // Another run won the race for this entry.
            Err(_) if target.symlink_metadata().is_ok() => {}
            Err(source) => {
                return Err(TemplateError::Io {
                    path: target,
                    source,
                })
            }
        }
    }

    staging.close().map_err(|source| TemplateError::Io {
        path: base_dir.to_path_buf(),
        source,
    })?;
    Ok(moved)
}

fn is_staging_dir(path: &Path) -> bool {
    path.is_dir()
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with(STAGING_PREFIX))
            .unwrap_or(false)
}

fn relative<'a>(path: &'a Path, base: &Path) -> &'a Path {
    path.strip_prefix(base).unwrap_or(path)
}

fn compare_paths(a: &Path, b: &Path) -> Ordering {
    let names = |path: &Path| -> Vec<String> {
        path.components()
            .filter_map(|component| match component {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect()
    };
    let (a, b) = (names(a), names(b));
    for (left, right) in a.iter().zip(&b) {
        match compare_versioned(left, right) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Compare two names treating runs of ASCII digits as numbers, so that
/// `eisvogel-3.10.0` sorts after `eisvogel-3.2.0`.
pub fn compare_versioned(a: &str, b: &str) -> Ordering {
    let (mut left, mut right) = (a, b);
    loop {
        match (left.is_empty(), right.is_empty()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }

        let (left_chunk, left_rest) = split_chunk(left);
        let (right_chunk, right_rest) = split_chunk(right);
        let ordering = match (is_digits(left_chunk), is_digits(right_chunk)) {
            (true, true) => compare_numeric(left_chunk, right_chunk),
            _ => left_chunk.cmp(right_chunk),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
        left = left_rest;
        right = right_rest;
    }
}

fn split_chunk(value: &str) -> (&str, &str) {
    let digits = value.starts_with(|c: char| c.is_ascii_digit());
    let end = value
        .find(|c: char| c.is_ascii_digit() != digits)
        .unwrap_or(value.len());
    value.split_at(end)
}

fn is_digits(chunk: &str) -> bool {
    chunk.starts_with(|c: char| c.is_ascii_digit())
}

fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a_trimmed = a.trim_start_matches('0');
    let b_trimmed = b.trim_start_matches('0');
    a_trimmed
        .len()
        .cmp(&b_trimmed.len())
        .then_with(|| a_trimmed.cmp(b_trimmed))
        .then_with(|| a.len().cmp(&b.len()))
}

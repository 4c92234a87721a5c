//! Downloading and unpacking files

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use briefcase_core::{BriefcaseError, Result};
use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::cache::ToolCache;
use crate::tool::{Tool, VerifyOptions};

static CONTENT_DISPOSITION_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename\*?\s*=\s*(?:UTF-8'')?"?([^";]+)"?"#).expect("Invalid regex")
});

const CHUNK_SIZE: usize = 1024 * 1024;

/// Retries for filesystem operations that can transiently fail while another
/// process (typically a virus scanner) holds the file open.
///
/// Only `PermissionDenied` is retried. Attempt `n` is followed by a sleep of
/// `delay * n` before the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn run<T>(&self, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied && attempt < self.attempts => {
                    warn!(attempt, error = %e, "filesystem operation denied; retrying");
                    thread::sleep(self.delay * attempt);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// File download and archive helper
#[derive(Debug)]
pub struct File {
    client: Client,
    retry: RetryPolicy,
}

impl Tool for File {
    const NAME: &'static str = "file";
    const FULL_NAME: &'static str = "File";

    fn verify_install(_tools: &ToolCache, _options: VerifyOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("briefcase/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| BriefcaseError::command(format!("Unable to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            retry: RetryPolicy::default(),
        })
    }
}

fn network_failure(description: &str, source: impl std::error::Error + Send + Sync + 'static) -> BriefcaseError {
    BriefcaseError::NetworkFailure {
        action: format!("download {}", description),
        source: Some(Box::new(source)),
    }
}

/// Name a download should be cached under: the `Content-Disposition`
/// filename when the server sends one, otherwise the last segment of the
/// final (post-redirect) URL
fn cache_name(response: &Response) -> String {
    let disposition = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| CONTENT_DISPOSITION_FILENAME.captures(value))
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty());

    let full_name = disposition.unwrap_or_else(|| response.url().path().to_string());
    full_name.rsplit('/').next().unwrap_or_default().to_string()
}

impl File {
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Download `url` into `download_path`, reusing an earlier download of
    /// the same file. `role` describes the file in error messages.
    pub fn download(&self, tools: &ToolCache, url: &str, download_path: &Path, role: Option<&str>) -> Result<PathBuf> {
        fs::create_dir_all(download_path)?;
        debug!(url, "downloading");

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| network_failure(role.unwrap_or(url), e))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                return Err(BriefcaseError::MissingNetworkResource { url: url.to_string() })
            }
            status => {
                return Err(BriefcaseError::BadNetworkResource {
                    url: url.to_string(),
                    status_code: status.as_u16(),
                })
            }
        }

        let name = cache_name(&response);
        let filename = download_path.join(&name);
        if filename.exists() {
            tools.console.info(format!("{} already downloaded", name));
        } else {
            tools.console.info(format!("Downloading {}...", name));
            self.fetch_and_write(tools, response, &filename)
                .map_err(|e| match e {
                    FetchError::Network(e) => network_failure(role.unwrap_or(&name), e),
                    FetchError::Io(e) => e.into(),
                    FetchError::Interrupted => BriefcaseError::Interrupted,
                })?;
        }
        Ok(filename)
    }

    /// Stream the body to a temporary sibling of `filename`, then move it
    /// into place so partial downloads never look complete
    fn fetch_and_write(&self, tools: &ToolCache, mut response: Response, filename: &Path) -> std::result::Result<(), FetchError> {
        let dir = filename.parent().unwrap_or_else(|| Path::new("."));
        let name = filename
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut temp = tempfile::Builder::new()
            .prefix(&format!("{}.", name))
            .suffix(".download")
            .tempfile_in(dir)
            .map_err(FetchError::Io)?;

        let progress = tools.console.progress_bar(response.content_length());
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            // Dropping `temp` removes the partial download
            if tools.is_interrupted() {
                progress.abandon();
                return Err(FetchError::Interrupted);
            }
            let read = response.read(&mut buf).map_err(FetchError::Network)?;
            if read == 0 {
                break;
            }
            temp.write_all(&buf[..read]).map_err(FetchError::Io)?;
            progress.inc(read as u64);
        }
        progress.finish_and_clear();
        temp.flush().map_err(FetchError::Io)?;

        let temp_path = temp.into_temp_path();
        self.retry
            .run(|| fs::rename(&temp_path, filename))
            .map_err(FetchError::Io)?;
        drop(temp_path);

        set_default_permissions(filename).map_err(FetchError::Io)
    }

    /// Whether `path` names an archive [`File::unpack_archive`] understands
    pub fn is_archive(path: &Path) -> bool {
        archive_kind(path).is_some()
    }

    /// Extract `archive` into `extract_dir`
    pub fn unpack_archive(&self, archive: &Path, extract_dir: &Path) -> Result<()> {
        debug!(archive = %archive.display(), dest = %extract_dir.display(), "unpacking archive");
        fs::create_dir_all(extract_dir)?;
        let file = fs::File::open(archive)?;
        match archive_kind(archive) {
            Some(ArchiveKind::Zip) => zip::ZipArchive::new(file)
                .and_then(|mut zip| zip.extract(extract_dir))
                .map_err(|e| unpack_error(archive, e)),
            Some(ArchiveKind::TarGz) => tar::Archive::new(flate2::read::GzDecoder::new(file))
                .unpack(extract_dir)
                .map_err(|e| unpack_error(archive, e)),
            Some(ArchiveKind::Tar) => tar::Archive::new(file)
                .unpack(extract_dir)
                .map_err(|e| unpack_error(archive, e)),
            None => Err(BriefcaseError::command(format!(
                "Unknown archive format for {}",
                archive.display()
            ))),
        }
    }
}

enum FetchError {
    Network(io::Error),
    Io(io::Error),
    Interrupted,
}

enum ArchiveKind {
    Zip,
    TarGz,
    Tar,
}

fn archive_kind(path: &Path) -> Option<ArchiveKind> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();
    if name.ends_with(".zip") {
        Some(ArchiveKind::Zip)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(ArchiveKind::TarGz)
    } else if name.ends_with(".tar") {
        Some(ArchiveKind::Tar)
    } else {
        None
    }
}

fn unpack_error(archive: &Path, e: impl std::fmt::Display) -> BriefcaseError {
    BriefcaseError::command(format!("Unable to unpack {}: {}", archive.display(), e))
}

/// Give a new file the permissions `open()` would have: 0o666 less the umask
#[cfg(unix)]
fn set_default_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    // SAFETY: umask(2) only swaps the process file mode creation mask
    let current = unsafe { libc::umask(0o022) };
    unsafe { libc::umask(current) };
    let mode = 0o666 & !(current as u32);
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_default_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

// ─── Runtime Provisioner ───
// One Java runtime per machine, shared by every branch. Downloaded from the
// platform-keyed descriptor on first use and never upgraded afterwards.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::core::config::LauncherConfig;
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::install::{
    extract_archive, flatten_directory, mark_executable, ArchiveKind, InstallLayout, InstallLease,
};
use crate::core::progress::{Reporter, Status};

/// Command name resolved through `PATH` when no managed runtime exists.
pub const SYSTEM_JAVA: &str = "java";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RuntimeBinary {
    /// Executable inside the managed runtime directory.
    Managed(PathBuf),
    /// Bare command name, left for the OS to resolve.
    System(String),
}

impl RuntimeBinary {
    pub fn as_os_str(&self) -> &OsStr {
        match self {
            RuntimeBinary::Managed(path) => path.as_os_str(),
            RuntimeBinary::System(command) => OsStr::new(command),
        }
    }

    pub fn is_managed(&self) -> bool {
        matches!(self, RuntimeBinary::Managed(_))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RuntimeDescriptor {
    #[serde(default)]
    version: String,
    download_url: HashMap<String, HashMap<String, RuntimeDownload>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RuntimeDownload {
    url: String,
    #[serde(default)]
    sha256: String,
}

impl RuntimeDescriptor {
    fn select(&self, os: &str, arch: &str) -> LauncherResult<&RuntimeDownload> {
        self.download_url
            .get(os)
            .and_then(|arches| arches.get(arch))
            .ok_or_else(|| LauncherError::PlatformUnsupported {
                os: os.to_string(),
                arch: arch.to_string(),
            })
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeProvisioner {
    downloader: Downloader,
    layout: InstallLayout,
    config: Arc<LauncherConfig>,
}

impl RuntimeProvisioner {
    pub fn new(downloader: Downloader, config: Arc<LauncherConfig>) -> Self {
        Self {
            downloader,
            layout: InstallLayout::new(&config),
            config,
        }
    }

    /// Make sure a runtime is available and return how to invoke it.
    ///
    /// An existing runtime executable short-circuits without touching the
    /// network. Network failures fall back to the system `java`; anything
    /// else (unsupported platform, bad checksum, broken archive, disk) is
    /// returned as an error.
    #[instrument(skip(self, reporter))]
    pub async fn ensure(&self, reporter: &Reporter) -> LauncherResult<RuntimeBinary> {
        reporter.status(Status::CheckingRuntime);

        let java = self.layout.java_path();
        if java.is_file() {
            debug!("Runtime already present at {:?}", java);
            reporter.done();
            return Ok(RuntimeBinary::Managed(java));
        }

        match self.provision(reporter).await {
            Ok(java) => Ok(RuntimeBinary::Managed(java)),
            Err(err) if err.is_network() => {
                warn!("Runtime download failed, using system java: {}", err);
                reporter.status(Status::SystemRuntimeFallback);
                reporter.done();
                Ok(RuntimeBinary::System(SYSTEM_JAVA.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    async fn provision(&self, reporter: &Reporter) -> LauncherResult<PathBuf> {
        let descriptor = self.fetch_descriptor().await?;
        let platform = self.layout.platform();
        let download = descriptor.select(&platform.os, &platform.arch)?;
        info!(
            "Provisioning runtime {} for {}",
            if descriptor.version.is_empty() { "?" } else { descriptor.version.as_str() },
            platform
        );

        let archive = self.layout.cache_dir().join(archive_file_name(&download.url));
        let kind = ArchiveKind::from_path(&archive)
            .ok_or_else(|| LauncherError::UnsupportedArchive(archive.clone()))?;

        self.obtain_archive(download, &archive, reporter).await?;

        reporter.status(Status::ExtractingRuntime);
        reporter.indeterminate();
        let runtime_dir = self.layout.runtime_dir();
        let java = self.layout.java_path();
        let _lease = InstallLease::acquire(&runtime_dir).await?;
        if java.is_file() {
            debug!("Runtime installed by another launcher while waiting");
            reporter.done();
            return Ok(java);
        }

        let staged = sibling_path(&runtime_dir, &format!("{}.tmp", Uuid::new_v4()));
        if let Err(err) = self.stage_runtime(&archive, kind, &staged).await {
            let _ = tokio::fs::remove_dir_all(&staged).await;
            return Err(err);
        }
        swap_into_place(&staged, &runtime_dir).await?;

        if let Err(err) = tokio::fs::remove_file(&archive).await {
            warn!("Could not delete runtime archive {:?}: {}", archive, err);
        }

        info!("Runtime installed at {:?}", runtime_dir);
        reporter.done();
        Ok(java)
    }

    /// Unpack into `staged` and check it holds a runnable `java`, leaving the
    /// live runtime directory untouched.
    async fn stage_runtime(
        &self,
        archive: &Path,
        kind: ArchiveKind,
        staged: &Path,
    ) -> LauncherResult<()> {
        unpack_runtime(archive.to_path_buf(), kind, staged.to_path_buf()).await?;

        let runtime_dir = self.layout.runtime_dir();
        let java = self.layout.java_path();
        let staged_java = match java.strip_prefix(&runtime_dir) {
            Ok(relative) => staged.join(relative),
            Err(_) => java.clone(),
        };
        if !staged_java.is_file() {
            return Err(LauncherError::Other(format!(
                "Runtime archive {} has no {}",
                archive.display(),
                java.display()
            )));
        }
        mark_executable(&staged_java)
    }

    async fn fetch_descriptor(&self) -> LauncherResult<RuntimeDescriptor> {
        let url = &self.config.runtime_descriptor_url;
        let response = self
            .downloader
            .client()
            .get(url)
            .timeout(self.config.probe_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::FetchFailed {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Leave a verified archive at `archive`, reusing the cached copy when it
    /// still matches. A cached copy failing verification is downloaded again
    /// once; a fresh download failing it is an error.
    async fn obtain_archive(
        &self,
        download: &RuntimeDownload,
        archive: &Path,
        reporter: &Reporter,
    ) -> LauncherResult<()> {
        let expected = self.expected_checksum(download);

        if archive.is_file() {
            match &expected {
                None => {
                    info!("Reusing cached runtime archive {:?}", archive);
                    return Ok(());
                }
                Some(expected) => match verify_sha256(archive, expected).await {
                    Ok(()) => {
                        info!("Reusing cached runtime archive {:?}", archive);
                        return Ok(());
                    }
                    Err(err) => {
                        warn!("Discarding cached runtime archive: {}", err);
                        tokio::fs::remove_file(archive)
                            .await
                            .map_err(LauncherError::io(archive))?;
                    }
                },
            }
        }

        reporter.status(Status::DownloadingRuntime);
        let file_name = archive
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let part = archive.with_file_name(format!("{file_name}.{}.part", Uuid::new_v4()));
        if let Err(err) = self.downloader.fetch(&download.url, &part, reporter).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(err);
        }
        tokio::fs::rename(&part, archive)
            .await
            .map_err(LauncherError::io(archive))?;

        if let Some(expected) = &expected {
            if let Err(err) = verify_sha256(archive, expected).await {
                let _ = tokio::fs::remove_file(archive).await;
                return Err(err);
            }
        }
        Ok(())
    }

    fn expected_checksum(&self, download: &RuntimeDownload) -> Option<String> {
        if !self.config.verify_runtime_checksum {
            return None;
        }
        let expected = download.sha256.trim();
        if expected.is_empty() {
            warn!("Runtime descriptor carries no checksum for {}", download.url);
            return None;
        }
        Some(expected.to_ascii_lowercase())
    }
}

/// Last path segment of the download URL, query string excluded.
fn archive_file_name(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty() && name != "..")
        .unwrap_or_else(|| "runtime.zip".to_string())
}

/// `<dir>.<suffix>` next to `dir`.
fn sibling_path(dir: &Path, suffix: &str) -> PathBuf {
    let mut name = dir.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    dir.with_file_name(name)
}

/// Replace `live` with `staged`. Whatever was in `live` (a previous runtime
/// or the leftovers of an interrupted install) is moved aside first and put
/// back if the final rename fails.
async fn swap_into_place(staged: &Path, live: &Path) -> LauncherResult<()> {
    let backup = sibling_path(live, "backup");
    if backup.exists() {
        let _ = tokio::fs::remove_dir_all(&backup).await;
    }
    if live.exists() {
        tokio::fs::rename(live, &backup)
            .await
            .map_err(LauncherError::io(&backup))?;
    }

    if let Err(source) = tokio::fs::rename(staged, live).await {
        if backup.exists() {
            let _ = tokio::fs::rename(&backup, live).await;
        }
        let _ = tokio::fs::remove_dir_all(staged).await;
        return Err(LauncherError::Io {
            path: live.to_path_buf(),
            source,
        });
    }

    if backup.exists() {
        if let Err(err) = tokio::fs::remove_dir_all(&backup).await {
            warn!("Could not remove old runtime {:?}: {}", backup, err);
        }
    }
    Ok(())
}

async fn unpack_runtime(archive: PathBuf, kind: ArchiveKind, dest: PathBuf) -> LauncherResult<()> {
    tokio::task::spawn_blocking(move || {
        extract_archive(&archive, kind, &dest)?;
        flatten_directory(&dest)?;
        Ok(())
    })
    .await
    .map_err(|e| LauncherError::Other(format!("Task join error: {e}")))?
}

pub(crate) async fn sha256_file(path: &Path) -> LauncherResult<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut file = std::fs::File::open(&path).map_err(LauncherError::io(&path))?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher).map_err(LauncherError::io(&path))?;
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(|e| LauncherError::Other(format!("Task join error: {e}")))?
}

async fn verify_sha256(path: &Path, expected: &str) -> LauncherResult<()> {
    let actual = sha256_file(path).await?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(LauncherError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        })
    }
}

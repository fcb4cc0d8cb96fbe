// ─── Patch Tool ───
// Local copy of the external binary-diff patcher, fetched on first use and
// never re-downloaded once its executable exists.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::core::config::LauncherConfig;
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::install::{
    extract_archive_blocking, mark_executable, ArchiveKind, InstallLayout, InstallLease,
};
use crate::core::progress::{Reporter, Status};

const TOOL_ARCHIVE: &str = "butler.zip";

#[derive(Debug, Clone)]
pub struct PatchTool {
    downloader: Downloader,
    layout: InstallLayout,
    config: Arc<LauncherConfig>,
}

impl PatchTool {
    pub fn new(downloader: Downloader, config: Arc<LauncherConfig>) -> Self {
        Self {
            downloader,
            layout: InstallLayout::new(&config),
            config,
        }
    }

    pub fn executable(&self) -> PathBuf {
        self.layout.patcher_path()
    }

    /// Path of a runnable patch tool, installing it first when missing.
    #[instrument(skip(self, reporter))]
    pub async fn ensure(&self, reporter: &Reporter) -> LauncherResult<PathBuf> {
        let exe = self.executable();
        if exe.is_file() {
            return Ok(exe);
        }

        let tool_dir = self.layout.patcher_dir();
        let _lease = InstallLease::acquire(&tool_dir).await?;
        if exe.is_file() {
            debug!("Patch tool installed by another task");
            return Ok(exe);
        }

        let url = self.config.patcher_url();
        info!("Installing patch tool from {}", url);
        reporter.status(Status::DownloadingPatcher);

        let archive = self.layout.cache_dir().join(TOOL_ARCHIVE);
        let part = archive.with_file_name(format!("{TOOL_ARCHIVE}.{}.part", Uuid::new_v4()));
        if let Err(err) = self.downloader.fetch(&url, &part, reporter).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(err);
        }
        tokio::fs::rename(&part, &archive)
            .await
            .map_err(LauncherError::io(&archive))?;

        reporter.status(Status::ExtractingPatcher);
        reporter.indeterminate();
        extract_archive_blocking(archive.clone(), ArchiveKind::Zip, tool_dir).await?;

        if let Err(err) = tokio::fs::remove_file(&archive).await {
            warn!("Could not delete patch tool archive {:?}: {}", archive, err);
        }

        if !exe.is_file() {
            return Err(LauncherError::PatcherUnavailable(exe));
        }
        mark_executable(&exe)?;

        reporter.done();
        info!("Patch tool ready at {:?}", exe);
        Ok(exe)
    }
}

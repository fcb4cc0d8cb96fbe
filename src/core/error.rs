use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Central error type for the entire launcher backend.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    FetchFailed { url: String, status: u16 },

    #[error("Download of {url} ended early: {received} of {expected} bytes")]
    DownloadTruncated {
        url: String,
        received: u64,
        expected: u64,
    },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-256 mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Unsupported archive format: {0:?}")]
    UnsupportedArchive(PathBuf),

    // ── Runtime ─────────────────────────────────────────
    #[error("No runtime available for platform {os}/{arch}")]
    PlatformUnsupported { os: String, arch: String },

    // ── Patcher ─────────────────────────────────────────
    #[error("Patch tool not found at {0:?} after installation")]
    PatcherUnavailable(PathBuf),

    #[error("Patch tool timed out after {} seconds", .0.as_secs())]
    PatchTimeout(Duration),

    #[error("Patch tool error (code {}): {stderr}", .exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    PatchToolError {
        exit_code: Option<i32>,
        stderr: String,
    },

    // ── Installation ────────────────────────────────────
    #[error("Timed out after {}s waiting for the install lease {path:?}", .waited.as_secs())]
    LeaseTimeout { path: PathBuf, waited: Duration },

    #[error("Game files are corrupted or missing: {path:?}")]
    CorruptedInstallation { path: PathBuf },

    #[error("Invalid branch name: {0:?}")]
    InvalidBranch(String),

    #[error("Invalid player name {0:?}: expected 3 to 16 characters without spaces")]
    InvalidPlayerName(String),

    #[error("Unknown version {version:?} for branch {branch}")]
    UnknownVersion { branch: String, version: String },

    // ── Launch ──────────────────────────────────────────
    #[error("Game client failed to start: {0}")]
    LaunchFailed(String),

    #[error("No installed version of branch {0} ships a dedicated server")]
    ServerNotInstalled(String),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl LauncherError {
    /// Whether the failure means the installation on disk can no longer be
    /// trusted, in which case the UI offers a full reinstall.
    pub fn is_corrupted_installation(&self) -> bool {
        matches!(self, LauncherError::CorruptedInstallation { .. })
    }

    /// Whether the failure happened on the wire rather than on disk.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            LauncherError::Http(_)
                | LauncherError::FetchFailed { .. }
                | LauncherError::DownloadTruncated { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| LauncherError::Io { path, source }
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

// ── Serialization for the UI boundary ───────────────────
// Front-ends receive the rendered message, never the inner types.
impl serde::Serialize for LauncherError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

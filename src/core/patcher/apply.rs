// ─── Patch Application ───
// Drives `<tool> apply --staging-dir <staging> <patch> <target>` under an
// install lease with a bounded wait.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::core::config::LauncherConfig;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::install::{InstallLayout, InstallLease};
use crate::core::progress::{Reporter, Status};

use super::tool::PatchTool;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

#[derive(Debug, Clone)]
pub struct PatchOrchestrator {
    tool: PatchTool,
    layout: InstallLayout,
    timeout: Duration,
}

impl PatchOrchestrator {
    pub fn new(tool: PatchTool, config: Arc<LauncherConfig>) -> Self {
        Self {
            tool,
            layout: InstallLayout::new(&config),
            timeout: config.patch_timeout,
        }
    }

    /// Apply `patch` onto `target_dir`.
    ///
    /// A timed-out run is killed and its staging directory left behind for
    /// inspection; a successful run removes it.
    #[instrument(skip_all, fields(patch = %patch.display(), dir = %target_dir.display()))]
    pub async fn apply(
        &self,
        patch: &Path,
        target_dir: &Path,
        reporter: &Reporter,
    ) -> LauncherResult<()> {
        let tool = self.tool.ensure(reporter).await?;
        let _lease = InstallLease::acquire(target_dir).await?;

        let staging = self.layout.staging_dir(target_dir);
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(LauncherError::io(&staging))?;

        reporter.status(Status::ApplyingPatch);
        reporter.indeterminate();

        let mut cmd = Command::new(&tool);
        cmd.arg("apply")
            .arg("--staging-dir")
            .arg(&staging)
            .arg(patch)
            .arg(target_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        info!("Running patch tool {:?} (timeout: {}s)", tool, self.timeout.as_secs());
        debug!("Command: {:?}", cmd);
        let mut child = cmd.spawn().map_err(LauncherError::io(&tool))?;

        let stdout = child.stdout.take().map(|out| tokio::spawn(drain_lines(out, false)));
        let stderr = child.stderr.take().map(|err| tokio::spawn(drain_lines(err, true)));

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status.map_err(LauncherError::io(&tool))?,
            Err(_) => {
                warn!("Patch tool exceeded {:?}, killing it", self.timeout);
                if let Err(err) = child.kill().await {
                    warn!("Failed to kill patch tool: {}", err);
                }
                return Err(LauncherError::PatchTimeout(self.timeout));
            }
        };

        if let Some(task) = stdout {
            let _ = task.await;
        }
        let stderr = match stderr {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(LauncherError::PatchToolError {
                exit_code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        if let Err(err) = tokio::fs::remove_dir_all(&staging).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                return Err(LauncherError::Io {
                    path: staging,
                    source: err,
                });
            }
        }

        reporter.done();
        reporter.status(Status::InstallComplete);
        info!("Patch applied to {:?}", target_dir);
        Ok(())
    }
}

/// Log every line of a child stream. Stderr lines are also collected for the
/// error message.
async fn drain_lines<R>(stream: R, is_stderr: bool) -> String
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    let mut collected = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            warn!("[patcher] {}", line);
            collected.push_str(&line);
            collected.push('\n');
        } else {
            debug!("[patcher] {}", line);
        }
    }
    collected
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use reqwest::Client;

    use crate::core::config::Platform;
    use crate::core::downloader::Downloader;
    use crate::core::install::{lock, mark_executable};
    use crate::core::progress::{drain, ProgressEvent};

    // Arguments seen by the script: $1=apply $2=--staging-dir $3=staging
    // $4=patch $5=target.
    const SUCCEEDS: &str = "#!/bin/sh\n\
        [ \"$1\" = apply ] || exit 64\n\
        [ -d \"$3\" ] || exit 65\n\
        [ -f \"$4\" ] || exit 66\n\
        mkdir -p \"$5/Client\" && touch \"$5/Client/HytaleClient\"\n";
    const FAILS: &str = "#!/bin/sh\necho 'corrupt patch' >&2\nexit 3\n";
    const HANGS: &str = "#!/bin/sh\nexec sleep 30\n";

    struct Fixture {
        _dir: tempfile::TempDir,
        orchestrator: PatchOrchestrator,
        patch: PathBuf,
        target: PathBuf,
    }

    fn fixture(script: &str, timeout: Duration) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LauncherConfig::for_data_dir(dir.path());
        config.platform = Platform::new("linux", "amd64");
        config.patcher_base_url = "http://127.0.0.1:1".into();
        config.patch_timeout = timeout;
        let config = Arc::new(config);

        let layout = InstallLayout::new(&config);
        std::fs::create_dir_all(layout.patcher_dir()).unwrap();
        std::fs::write(layout.patcher_path(), script).unwrap();
        mark_executable(&layout.patcher_path()).unwrap();

        let patch = dir.path().join("1.pwr");
        std::fs::write(&patch, b"pwr").unwrap();
        let target = dir.path().join("game").join("latest");

        let tool = PatchTool::new(Downloader::from_config(Client::new(), &config), config.clone());
        Fixture {
            orchestrator: PatchOrchestrator::new(tool, config),
            patch,
            target,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn success_removes_staging() {
        let fx = fixture(SUCCEEDS, Duration::from_secs(30));
        let (reporter, mut rx) = Reporter::channel();

        fx.orchestrator
            .apply(&fx.patch, &fx.target, &reporter)
            .await
            .unwrap();

        assert!(fx.target.join("Client").join("HytaleClient").is_file());
        assert!(!fx.target.join("staging-temp").exists());
        assert!(!lock::lock_path_for(&fx.target).exists());

        let events = drain(&mut rx);
        assert_eq!(
            events.last(),
            Some(&ProgressEvent::Status(Status::InstallComplete))
        );
        assert!(events.contains(&ProgressEvent::Status(Status::ApplyingPatch)));
    }

    #[tokio::test]
    async fn nonzero_exit_carries_code_and_stderr() {
        let fx = fixture(FAILS, Duration::from_secs(30));

        let err = fx
            .orchestrator
            .apply(&fx.patch, &fx.target, &Reporter::silent())
            .await
            .unwrap_err();

        match err {
            LauncherError::PatchToolError { exit_code, stderr } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr, "corrupt patch");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!lock::lock_path_for(&fx.target).exists());
    }

    #[tokio::test]
    async fn timeout_kills_and_keeps_staging() {
        let fx = fixture(HANGS, Duration::from_millis(300));

        let err = fx
            .orchestrator
            .apply(&fx.patch, &fx.target, &Reporter::silent())
            .await
            .unwrap_err();

        assert!(matches!(err, LauncherError::PatchTimeout(_)), "{err}");
        assert!(fx.target.join("staging-temp").is_dir());
    }
}

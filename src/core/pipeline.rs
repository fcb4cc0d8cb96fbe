// ─── Install Pipeline ───
// discover → runtime → fetch → patch → launch, one logical sequence per call.
// Every component shares one HTTP client and one configuration.

use std::path::Path;
use std::sync::Arc;

use reqwest::Client;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::core::config::LauncherConfig;
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::build_http_client;
use crate::core::install::{InstallLayout, InstallLease};
use crate::core::java::{RuntimeBinary, RuntimeProvisioner};
use crate::core::launch::{self, validate_player_name, LaunchedGame, LaunchedServer};
use crate::core::patcher::{PatchOrchestrator, PatchTool};
use crate::core::progress::{Reporter, Status};
use crate::core::version::{validate_branch, GameVersion, VersionResolver};

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Arc<LauncherConfig>,
    layout: InstallLayout,
    downloader: Downloader,
    resolver: VersionResolver,
    runtime: RuntimeProvisioner,
    patcher: PatchOrchestrator,
}

impl Pipeline {
    pub fn new(config: LauncherConfig) -> LauncherResult<Self> {
        let client = build_http_client(&config)?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: LauncherConfig, client: Client) -> Self {
        let config = Arc::new(config);
        let downloader = Downloader::from_config(client.clone(), &config);
        let tool = PatchTool::new(downloader.clone(), config.clone());

        Self {
            layout: InstallLayout::new(&config),
            resolver: VersionResolver::new(client, config.clone()),
            runtime: RuntimeProvisioner::new(downloader.clone(), config.clone()),
            patcher: PatchOrchestrator::new(tool, config.clone()),
            downloader,
            config,
        }
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    pub async fn check_versions(
        &self,
        branch: &str,
        reporter: &Reporter,
    ) -> LauncherResult<Vec<GameVersion>> {
        self.resolver.discover(branch, reporter).await
    }

    pub fn is_installed(&self, version: &GameVersion) -> bool {
        self.layout.is_installed(version)
    }

    pub async fn ensure_runtime(&self, reporter: &Reporter) -> LauncherResult<RuntimeBinary> {
        self.runtime.ensure(reporter).await
    }

    /// Make `version` launch-ready. An installed version is left alone and
    /// costs no network traffic.
    #[instrument(skip(self, reporter), fields(branch = %version.branch, folder = %version.folder_name()))]
    pub async fn install(&self, version: &GameVersion, reporter: &Reporter) -> LauncherResult<()> {
        validate_branch(&version.branch)?;
        reporter.status(Status::CheckingGame);

        if self.layout.is_installed(version) {
            info!("{} already installed", version);
            reporter.status(Status::GameInstalled);
            reporter.done();
            return Ok(());
        }

        let patch = self.layout.cached_patch_path(version);
        if patch.is_file() {
            info!("Using cached patch {:?}", patch);
            reporter.status(Status::PatchCached);
        } else {
            reporter.status(Status::Downloading {
                version: version.display_name.clone(),
            });
            let url = self.config.patch_url(&version.branch, version.artifact_id);
            self.fetch_into_place(&url, &patch, reporter).await?;
        }

        reporter.status(Status::Installing);
        let target = self.layout.version_dir(version);
        self.patcher.apply(&patch, &target, reporter).await?;

        if !self.layout.is_installed(version) {
            return Err(LauncherError::CorruptedInstallation {
                path: self.layout.client_path(version),
            });
        }

        if let Err(err) = tokio::fs::remove_file(&patch).await {
            warn!("Could not delete cached patch {:?}: {}", patch, err);
        }
        Ok(())
    }

    /// Runtime, installation, then spawn the client.
    #[instrument(skip(self, reporter), fields(branch = %version.branch, folder = %version.folder_name()))]
    pub async fn launch(
        &self,
        player_name: &str,
        version: &GameVersion,
        reporter: &Reporter,
    ) -> LauncherResult<LaunchedGame> {
        let player_name = validate_player_name(player_name)?;
        validate_branch(&version.branch)?;

        let java = self.runtime.ensure(reporter).await?;
        self.install(version, reporter).await?;

        reporter.status(Status::Launching);
        launch::launch(
            &self.layout,
            version,
            &java,
            &player_name,
            &self.config.extra_game_args,
        )
    }

    /// Start the dedicated server shipped with an installed version of
    /// `branch`. Nothing is downloaded.
    #[instrument(skip(self))]
    pub fn start_server(&self, branch: &str) -> LauncherResult<LaunchedServer> {
        validate_branch(branch)?;
        let script = self
            .layout
            .find_server_script(branch)
            .ok_or_else(|| LauncherError::ServerNotInstalled(branch.to_string()))?;
        launch::start_server(&script)
    }

    /// Wipe the version directory, then install it again.
    #[instrument(skip(self, reporter), fields(branch = %version.branch, folder = %version.folder_name()))]
    pub async fn reinstall(&self, version: &GameVersion, reporter: &Reporter) -> LauncherResult<()> {
        validate_branch(&version.branch)?;
        let target = self.layout.version_dir(version);
        {
            let _lease = InstallLease::acquire(&target).await?;
            match tokio::fs::remove_dir_all(&target).await {
                Ok(()) => info!("Removed {:?} for reinstall", target),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(LauncherError::Io { path: target, source }),
            }
        }
        self.install(version, reporter).await
    }

    /// Download into a unique sibling `.part` file and rename it over `dest`
    /// once complete, so concurrent fetches never share bytes.
    async fn fetch_into_place(&self, url: &str, dest: &Path, reporter: &Reporter) -> LauncherResult<()> {
        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let part = dest.with_file_name(format!("{file_name}.{}.part", Uuid::new_v4()));

        if let Err(err) = self.downloader.fetch(url, &part, reporter).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(err);
        }
        tokio::fs::rename(&part, dest)
            .await
            .map_err(LauncherError::io(dest))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::core::config::Platform;
    use crate::core::install::mark_executable;
    use crate::core::progress::{drain, ProgressEvent};

    // $3 = staging dir, $4 = patch, $5 = target.
    const PATCHER: &str = "#!/bin/sh\n\
        [ -f \"$4\" ] || exit 66\n\
        mkdir -p \"$5/Client\"\n\
        printf '#!/bin/sh\\nexit 0\\n' > \"$5/Client/HytaleClient\"\n\
        chmod +x \"$5/Client/HytaleClient\"\n";
    const PATCHER_WITHOUT_CLIENT: &str = "#!/bin/sh\nmkdir -p \"$5/Assets\"\n";
    const PATCHER_FAILING: &str = "#!/bin/sh\necho broken >&2\nexit 2\n";

    struct Fixture {
        dir: tempfile::TempDir,
        pipeline: Pipeline,
    }

    impl Fixture {
        fn layout(&self) -> &InstallLayout {
            self.pipeline.layout()
        }

        fn root(&self) -> PathBuf {
            self.dir.path().to_path_buf()
        }
    }

    fn fixture(server_url: &str, patcher: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LauncherConfig::for_data_dir(dir.path());
        config.platform = Platform::new("linux", "amd64");
        config.patch_host = server_url.to_string();
        config.runtime_descriptor_url = format!("{server_url}/jre.json");
        config.patcher_base_url = format!("{server_url}/butler");
        config.extra_game_args = vec!["--windowed".into()];
        let pipeline = Pipeline::with_client(config, Client::new());

        let layout = pipeline.layout();
        std::fs::create_dir_all(layout.patcher_dir()).unwrap();
        std::fs::write(layout.patcher_path(), patcher).unwrap();
        mark_executable(&layout.patcher_path()).unwrap();

        std::fs::create_dir_all(layout.java_path().parent().unwrap()).unwrap();
        std::fs::write(layout.java_path(), b"").unwrap();

        Fixture { dir, pipeline }
    }

    fn statuses(events: Vec<ProgressEvent>) -> Vec<Status> {
        events
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn fresh_install_downloads_applies_and_cleans_up() {
        let mut server = mockito::Server::new_async().await;
        let patch = server
            .mock("GET", "/linux/amd64/release/0/3.pwr")
            .with_body(b"pwr-bytes".to_vec())
            .expect(1)
            .create_async()
            .await;
        let fx = fixture(&server.url(), PATCHER);
        let version = GameVersion::latest("release", 3);
        let (reporter, mut rx) = Reporter::channel();

        assert!(!fx.pipeline.is_installed(&version));
        fx.pipeline.install(&version, &reporter).await.unwrap();

        patch.assert_async().await;
        assert!(fx.pipeline.is_installed(&version));
        assert!(!fx.layout().cached_patch_path(&version).exists());
        assert!(!fx.layout().staging_dir(&fx.layout().version_dir(&version)).exists());
        assert_eq!(
            statuses(drain(&mut rx)),
            vec![
                Status::CheckingGame,
                Status::Downloading {
                    version: "Latest".into()
                },
                Status::Installing,
                Status::ApplyingPatch,
                Status::InstallComplete,
            ]
        );
    }

    #[tokio::test]
    async fn installed_version_makes_no_requests() {
        let mut server = mockito::Server::new_async().await;
        let patch = server
            .mock("GET", "/linux/amd64/release/0/3.pwr")
            .with_body(b"pwr-bytes".to_vec())
            .expect(1)
            .create_async()
            .await;
        let descriptor = server
            .mock("GET", "/jre.json")
            .expect(0)
            .create_async()
            .await;
        let fx = fixture(&server.url(), PATCHER);
        let version = GameVersion::numbered("release", 3);

        fx.pipeline.install(&version, &Reporter::silent()).await.unwrap();
        let (reporter, mut rx) = Reporter::channel();
        fx.pipeline.install(&version, &reporter).await.unwrap();
        fx.pipeline.ensure_runtime(&Reporter::silent()).await.unwrap();

        patch.assert_async().await;
        descriptor.assert_async().await;
        assert_eq!(
            statuses(drain(&mut rx)),
            vec![Status::CheckingGame, Status::GameInstalled]
        );
    }

    #[tokio::test]
    async fn cached_patch_is_reused() {
        let mut server = mockito::Server::new_async().await;
        let patch = server
            .mock("GET", "/linux/amd64/beta/0/2.pwr")
            .expect(0)
            .create_async()
            .await;
        let fx = fixture(&server.url(), PATCHER);
        let version = GameVersion::numbered("beta", 2);
        let cached = fx.layout().cached_patch_path(&version);
        std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
        std::fs::write(&cached, b"cached").unwrap();
        let (reporter, mut rx) = Reporter::channel();

        fx.pipeline.install(&version, &reporter).await.unwrap();

        patch.assert_async().await;
        assert!(statuses(drain(&mut rx)).contains(&Status::PatchCached));
        assert!(!cached.exists());
    }

    #[tokio::test]
    async fn failed_apply_keeps_the_cached_patch() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/linux/amd64/release/0/1.pwr")
            .with_body(b"pwr".to_vec())
            .create_async()
            .await;
        let fx = fixture(&server.url(), PATCHER_FAILING);
        let version = GameVersion::numbered("release", 1);

        let err = fx
            .pipeline
            .install(&version, &Reporter::silent())
            .await
            .unwrap_err();

        assert!(matches!(err, LauncherError::PatchToolError { exit_code: Some(2), .. }), "{err}");
        assert!(fx.layout().cached_patch_path(&version).is_file());
        assert!(!fx.pipeline.is_installed(&version));
    }

    #[tokio::test]
    async fn missing_client_after_apply_is_corruption() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/linux/amd64/release/0/1.pwr")
            .with_body(b"pwr".to_vec())
            .create_async()
            .await;
        let fx = fixture(&server.url(), PATCHER_WITHOUT_CLIENT);

        let err = fx
            .pipeline
            .install(&GameVersion::numbered("release", 1), &Reporter::silent())
            .await
            .unwrap_err();

        assert!(err.is_corrupted_installation(), "{err}");
    }

    #[tokio::test]
    async fn download_failure_is_fatal_and_leaves_nothing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/linux/amd64/release/0/9.pwr")
            .with_status(404)
            .create_async()
            .await;
        let fx = fixture(&server.url(), PATCHER);
        let version = GameVersion::numbered("release", 9);

        let err = fx
            .pipeline
            .install(&version, &Reporter::silent())
            .await
            .unwrap_err();

        assert!(matches!(err, LauncherError::FetchFailed { status: 404, .. }), "{err}");
        let cache = fx.layout().cache_dir();
        let leftovers = std::fs::read_dir(&cache)
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn launch_installs_then_spawns() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/linux/amd64/release/0/5.pwr")
            .with_body(b"pwr".to_vec())
            .create_async()
            .await;
        let fx = fixture(&server.url(), PATCHER);
        let version = GameVersion::latest("release", 5);
        let (reporter, mut rx) = Reporter::channel();

        let launched = fx.pipeline.launch("Player", &version, &reporter).await.unwrap();

        assert!(launched.pid > 0);
        let statuses = statuses(drain(&mut rx));
        assert_eq!(statuses.first(), Some(&Status::CheckingRuntime));
        assert_eq!(statuses.last(), Some(&Status::Launching));
    }

    #[tokio::test]
    async fn bad_player_name_fails_before_any_work() {
        let mut server = mockito::Server::new_async().await;
        let descriptor = server
            .mock("GET", "/jre.json")
            .expect(0)
            .create_async()
            .await;
        let fx = fixture(&server.url(), PATCHER);
        std::fs::remove_file(fx.layout().java_path()).unwrap();

        let err = fx
            .pipeline
            .launch("x", &GameVersion::latest("release", 1), &Reporter::silent())
            .await
            .unwrap_err();

        assert!(matches!(err, LauncherError::InvalidPlayerName(_)), "{err}");
        descriptor.assert_async().await;
    }

    #[tokio::test]
    async fn server_starts_from_an_installed_version() {
        let fx = fixture("http://127.0.0.1:1", PATCHER);

        let err = fx.pipeline.start_server("release").unwrap_err();
        assert!(matches!(err, LauncherError::ServerNotInstalled(ref b) if b == "release"), "{err}");

        let script = fx.layout().server_script(&GameVersion::numbered("release", 4));
        std::fs::create_dir_all(script.parent().unwrap()).unwrap();
        std::fs::write(&script, "exit 0\n").unwrap();

        let started = fx.pipeline.start_server("release").unwrap();
        assert_eq!(started.script, script);

        assert!(matches!(
            fx.pipeline.start_server("../release"),
            Err(LauncherError::InvalidBranch(_))
        ));
    }

    #[tokio::test]
    async fn reinstall_wipes_the_version_directory() {
        let mut server = mockito::Server::new_async().await;
        let patch = server
            .mock("GET", "/linux/amd64/release/0/2.pwr")
            .with_body(b"pwr".to_vec())
            .expect(1)
            .create_async()
            .await;
        let fx = fixture(&server.url(), PATCHER);
        let version = GameVersion::numbered("release", 2);
        let target = fx.layout().version_dir(&version);
        std::fs::create_dir_all(target.join("Client")).unwrap();
        std::fs::write(fx.layout().client_path(&version), b"old").unwrap();
        std::fs::write(target.join("stale.dat"), b"stale").unwrap();

        fx.pipeline.reinstall(&version, &Reporter::silent()).await.unwrap();

        patch.assert_async().await;
        assert!(!target.join("stale.dat").exists());
        assert!(fx.pipeline.is_installed(&version));
        assert!(fx.root().join("Hytale").exists());
    }
}

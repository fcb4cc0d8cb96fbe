// ─── Installation Layout ───
// Deterministic on-disk locations for every branch/version, the shared
// runtime, the patch tool and the artifact cache.

use std::path::{Path, PathBuf};

use crate::core::config::{LauncherConfig, Platform};
use crate::core::version::GameVersion;

const CLIENT_DIR: &str = "Client";
const CLIENT_STEM: &str = "HytaleClient";
const RUNTIME_BRANCH: &str = "release";
const LATEST_FOLDER: &str = "latest";
const STAGING_DIR: &str = "staging-temp";
const PATCHER_DIR: &str = "butler";
const PATCHER_STEM: &str = "butler";
const SERVER_DIR: &str = "Server";
const SERVER_SCRIPT_STEM: &str = "start-server";

#[derive(Debug, Clone)]
pub struct InstallLayout {
    game_root: PathBuf,
    launcher_dir: PathBuf,
    platform: Platform,
}

impl InstallLayout {
    pub fn new(config: &LauncherConfig) -> Self {
        Self {
            game_root: config.game_root.clone(),
            launcher_dir: config.launcher_dir.clone(),
            platform: config.platform.clone(),
        }
    }

    pub fn game_root(&self) -> &Path {
        &self.game_root
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// `<root>/<branch>/package/game/<folder>`, where `folder` is `latest`
    /// for the synthetic entry and the artifact id otherwise.
    pub fn version_dir(&self, version: &GameVersion) -> PathBuf {
        self.branch_dir(&version.branch).join(version.folder_name())
    }

    /// `<root>/<branch>/package/game`, parent of every version folder.
    pub fn branch_dir(&self, branch: &str) -> PathBuf {
        self.game_root.join(branch).join("package").join("game")
    }

    pub fn client_path(&self, version: &GameVersion) -> PathBuf {
        self.version_dir(version)
            .join(CLIENT_DIR)
            .join(self.platform.executable_name(CLIENT_STEM))
    }

    pub fn staging_dir(&self, target_dir: &Path) -> PathBuf {
        target_dir.join(STAGING_DIR)
    }

    /// Launch script of the dedicated server bundled with `version`.
    pub fn server_script(&self, version: &GameVersion) -> PathBuf {
        self.version_dir(version)
            .join(SERVER_DIR)
            .join(self.platform.script_name(SERVER_SCRIPT_STEM))
    }

    /// Server script of the first installed version of `branch` that ships
    /// one. `latest` is checked first, then numbered folders in order.
    pub fn find_server_script(&self, branch: &str) -> Option<PathBuf> {
        let mut folders: Vec<PathBuf> = std::fs::read_dir(self.branch_dir(branch))
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        folders.sort_by_key(|path| {
            let name = path.file_name().map(|n| n.to_string_lossy().to_string());
            match name.as_deref() {
                Some(LATEST_FOLDER) => (0, 0, String::new()),
                Some(other) => match other.parse::<u32>() {
                    Ok(id) => (1, id, String::new()),
                    Err(_) => (2, 0, other.to_string()),
                },
                None => (3, 0, String::new()),
            }
        });

        let script = self.platform.script_name(SERVER_SCRIPT_STEM);
        folders
            .into_iter()
            .map(|folder| folder.join(SERVER_DIR).join(&script))
            .find(|path| path.is_file())
    }

    /// Installed iff the client executable exists. No manifest, no checksum.
    pub fn is_installed(&self, version: &GameVersion) -> bool {
        self.client_path(version).is_file()
    }

    // ── Runtime ─────────────────────────────────────────

    /// One runtime per machine, shared by every branch.
    pub fn runtime_dir(&self) -> PathBuf {
        self.game_root
            .join(RUNTIME_BRANCH)
            .join("package")
            .join("jre")
            .join(LATEST_FOLDER)
    }

    pub fn java_path(&self) -> PathBuf {
        self.runtime_dir()
            .join("bin")
            .join(self.platform.executable_name("java"))
    }

    // ── Launcher-owned ──────────────────────────────────

    pub fn cache_dir(&self) -> PathBuf {
        self.launcher_dir.join("cache")
    }

    /// `cache/<branch>_<id>.pwr`; the latest alias shares its file with the
    /// numbered version it points at.
    pub fn cached_patch_path(&self, version: &GameVersion) -> PathBuf {
        self.cache_dir()
            .join(format!("{}_{}", version.branch, version.artifact_file()))
    }

    pub fn patcher_dir(&self) -> PathBuf {
        self.launcher_dir.join(PATCHER_DIR)
    }

    pub fn patcher_path(&self) -> PathBuf {
        self.patcher_dir()
            .join(self.platform.executable_name(PATCHER_STEM))
    }
}

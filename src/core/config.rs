// ─── Launcher Configuration ───
// Built once at startup and handed by reference to every component.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const LAUNCHER_DIR_NAME: &str = "HyTaLauncher";
const GAME_DIR_NAME: &str = "Hytale";

const DEFAULT_PATCH_HOST: &str = "https://game-patches.hytale.com/patches";
const DEFAULT_RUNTIME_DESCRIPTOR_URL: &str = "https://launcher.hytale.com/version/release/jre.json";
const DEFAULT_PATCHER_BASE_URL: &str = "https://broth.itch.zone/butler";

pub const DEFAULT_MAX_PROBE: u32 = 20;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PATCH_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_DOWNLOAD_BUFFER: usize = 128 * 1024;

/// Operating system / architecture pair in the vocabulary of the patch
/// server (`windows/amd64`, `linux/arm64`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "windows" => "windows",
            "macos" => "darwin",
            "linux" => "linux",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "x86",
            other => other,
        };
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    /// Appends `.exe` on Windows.
    pub fn executable_name(&self, stem: &str) -> String {
        if self.is_windows() {
            format!("{stem}.exe")
        } else {
            stem.to_string()
        }
    }

    /// `start-server.bat` on Windows, `start-server.sh` elsewhere.
    pub fn script_name(&self, stem: &str) -> String {
        if self.is_windows() {
            format!("{stem}.bat")
        } else {
            format!("{stem}.sh")
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Launcher-owned data: cache, patch tool, logs.
    pub launcher_dir: PathBuf,
    /// Root of the per-branch game tree (`<root>/<branch>/package/...`).
    pub game_root: PathBuf,
    pub patch_host: String,
    pub mirror_host: Option<String>,
    pub use_mirror: bool,
    pub runtime_descriptor_url: String,
    pub patcher_base_url: String,
    pub platform: Platform,
    pub max_probe: u32,
    pub probe_timeout: Duration,
    pub patch_timeout: Duration,
    pub download_buffer_size: usize,
    pub verify_runtime_checksum: bool,
    pub extra_game_args: Vec<String>,
    pub verbose_logging: bool,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::for_data_dir(&base)
    }
}

impl LauncherConfig {
    /// Configuration rooted at `data_dir`, everything else at its defaults.
    pub fn for_data_dir(data_dir: &Path) -> Self {
        Self {
            launcher_dir: data_dir.join(LAUNCHER_DIR_NAME),
            game_root: data_dir.join(GAME_DIR_NAME).join("install"),
            patch_host: DEFAULT_PATCH_HOST.to_string(),
            mirror_host: None,
            use_mirror: false,
            runtime_descriptor_url: DEFAULT_RUNTIME_DESCRIPTOR_URL.to_string(),
            patcher_base_url: DEFAULT_PATCHER_BASE_URL.to_string(),
            platform: Platform::current(),
            max_probe: DEFAULT_MAX_PROBE,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            patch_timeout: DEFAULT_PATCH_TIMEOUT,
            download_buffer_size: DEFAULT_DOWNLOAD_BUFFER,
            verify_runtime_checksum: true,
            extra_game_args: Vec::new(),
            verbose_logging: false,
        }
    }

    /// Defaults overridden by `HYTA_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = match get("HYTA_DATA_DIR") {
            Some(dir) => Self::for_data_dir(Path::new(&dir)),
            None => Self::default(),
        };

        if let Some(dir) = get("HYTA_GAME_DIR") {
            config.game_root = PathBuf::from(dir);
        }
        if let Some(host) = get("HYTA_PATCH_HOST") {
            config.patch_host = host.trim_end_matches('/').to_string();
        }
        if let Some(mirror) = get("HYTA_MIRROR_URL") {
            config.mirror_host = Some(mirror.trim_end_matches('/').to_string());
        }
        if let Some(flag) = get("HYTA_USE_MIRROR") {
            config.use_mirror = parse_flag(&flag);
        }
        if let Some(secs) = get("HYTA_PATCH_TIMEOUT_SECS").and_then(|s| s.parse::<u64>().ok()) {
            config.patch_timeout = Duration::from_secs(secs);
        }
        if let Some(flag) = get("HYTA_VERBOSE") {
            config.verbose_logging = parse_flag(&flag);
        }
        if let Some(args) = get("HYTA_GAME_ARGS") {
            config.extra_game_args = args.split_whitespace().map(str::to_string).collect();
        }

        config
    }

    /// Host serving probes and patch containers. The mirror only wins when
    /// it is both enabled and configured.
    pub fn effective_patch_host(&self) -> &str {
        match (&self.mirror_host, self.use_mirror) {
            (Some(mirror), true) => mirror,
            _ => &self.patch_host,
        }
    }

    /// `{host}/{os}/{arch}/{branch}/0/{id}.pwr`
    pub fn patch_url(&self, branch: &str, artifact_id: u32) -> String {
        format!(
            "{}/{}/{}/{}/0/{}.pwr",
            self.effective_patch_host(),
            self.platform.os,
            self.platform.arch,
            branch,
            artifact_id
        )
    }

    /// Latest archive of the patch tool for the current platform.
    pub fn patcher_url(&self) -> String {
        format!(
            "{}/{}-{}/LATEST/archive/default",
            self.patcher_base_url, self.platform.os, self.platform.arch
        )
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.launcher_dir.join("logs")
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

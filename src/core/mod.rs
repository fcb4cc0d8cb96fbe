// ─── HyTaLauncher Core ───
// Installer / patch pipeline behind the launcher front-ends.
//
// Architecture:
//   core/
//     config      : LauncherConfig + platform detection
//     error       : LauncherError, shared by every module
//     progress    : Status / progress events and the Reporter channel
//     http        : Shared reqwest client
//     downloader/ : Streaming HTTP-to-disk fetcher
//     version/    : GameVersion + branch probing
//     install/    : Layout paths, archives, flattening, install lease
//     java/       : Managed Java runtime with system fallback
//     patcher/    : Patch tool download + apply with staging and timeout
//     launch/     : Game client process spawner
//     pipeline    : discover → runtime → fetch → patch → launch
//     state/      : Caller-side application state

pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod install;
pub mod java;
pub mod launch;
pub mod patcher;
pub mod pipeline;
pub mod progress;
pub mod state;
pub mod version;

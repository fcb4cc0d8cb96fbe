// ─── Front-end Commands ───
// The operations a UI invokes. The state lock is never held across network
// or process work, so a slow install does not block status queries.

use tracing::info;

use crate::core::error::LauncherError;
use crate::core::launch::{LaunchedGame, LaunchedServer};
use crate::core::progress::Reporter;
use crate::core::state::SharedState;
use crate::core::version::GameVersion;

/// Discover the versions of `branch` and remember them for later lookups.
pub async fn check_versions(
    state: &SharedState,
    branch: &str,
    reporter: &Reporter,
) -> Result<Vec<GameVersion>, LauncherError> {
    let pipeline = state.lock().await.pipeline().clone();
    let versions = pipeline.check_versions(branch, reporter).await?;
    state.lock().await.remember_versions(branch, versions.clone());
    Ok(versions)
}

pub async fn launch_game(
    state: &SharedState,
    branch: &str,
    selector: &str,
    player_name: &str,
    reporter: &Reporter,
) -> Result<LaunchedGame, LauncherError> {
    let version = resolve_version(state, branch, selector, reporter).await?;
    let pipeline = state.lock().await.pipeline().clone();
    let launched = pipeline.launch(player_name, &version, reporter).await?;
    info!("Game started (pid {})", launched.pid);
    Ok(launched)
}

pub async fn reinstall_game(
    state: &SharedState,
    branch: &str,
    selector: &str,
    reporter: &Reporter,
) -> Result<(), LauncherError> {
    let version = resolve_version(state, branch, selector, reporter).await?;
    let pipeline = state.lock().await.pipeline().clone();
    pipeline.reinstall(&version, reporter).await
}

pub async fn is_game_installed(
    state: &SharedState,
    branch: &str,
    selector: &str,
) -> Result<bool, LauncherError> {
    let version = resolve_version(state, branch, selector, &Reporter::silent()).await?;
    Ok(state.lock().await.pipeline().is_installed(&version))
}

/// Start the dedicated server of an installed version of `branch`.
pub async fn start_server(
    state: &SharedState,
    branch: &str,
) -> Result<LaunchedServer, LauncherError> {
    let pipeline = state.lock().await.pipeline().clone();
    let started = pipeline.start_server(branch)?;
    info!("Dedicated server started (pid {})", started.pid);
    Ok(started)
}

/// Cached lookup; a branch never checked before is discovered first.
async fn resolve_version(
    state: &SharedState,
    branch: &str,
    selector: &str,
    reporter: &Reporter,
) -> Result<GameVersion, LauncherError> {
    {
        let guard = state.lock().await;
        if guard.cached_versions(branch).is_some() {
            return guard.find_version(branch, selector);
        }
    }
    check_versions(state, branch, reporter).await?;
    state.lock().await.find_version(branch, selector)
}

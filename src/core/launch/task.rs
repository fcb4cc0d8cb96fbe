// ─── Launch Task ───
// Spawns the game client of an installed version with the offline session
// arguments.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::install::InstallLayout;
use crate::core::java::RuntimeBinary;
use crate::core::version::GameVersion;

const MIN_NAME_LEN: usize = 3;
const MAX_NAME_LEN: usize = 16;

/// A started client. The launcher does not wait for it.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchedGame {
    pub pid: u32,
    pub session_id: Uuid,
}

/// A started dedicated server, running from its own `Server` directory.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchedServer {
    pub pid: u32,
    pub script: PathBuf,
}

/// Trimmed player name, 3 to 16 characters, no whitespace inside.
pub fn validate_player_name(raw: &str) -> LauncherResult<String> {
    let name = raw.trim();
    let len = name.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) || name.chars().any(char::is_whitespace) {
        return Err(LauncherError::InvalidPlayerName(raw.to_string()));
    }
    Ok(name.to_string())
}

/// Command line for the client of `version`.
///
/// A missing client executable means the installation is broken and is
/// reported as such so the caller can offer a reinstall.
pub fn build_command(
    layout: &InstallLayout,
    version: &GameVersion,
    java: &RuntimeBinary,
    player_name: &str,
    session_id: Uuid,
    extra_args: &[String],
) -> LauncherResult<Command> {
    let client = layout.client_path(version);
    if !client.is_file() {
        return Err(LauncherError::CorruptedInstallation { path: client });
    }
    let app_dir = layout.version_dir(version);

    let mut cmd = Command::new(&client);
    cmd.arg("--app-dir")
        .arg(&app_dir)
        .arg("--java-exec")
        .arg(java.as_os_str())
        .arg("--auth-mode")
        .arg("offline")
        .arg("--uuid")
        .arg(session_id.to_string())
        .arg("--name")
        .arg(player_name);
    cmd.args(extra_args);

    if let Some(client_dir) = client.parent() {
        cmd.current_dir(client_dir);
    }
    configure_platform_spawn(&mut cmd);
    Ok(cmd)
}

/// Start the client and return right after spawning.
pub fn launch(
    layout: &InstallLayout,
    version: &GameVersion,
    java: &RuntimeBinary,
    player_name: &str,
    extra_args: &[String],
) -> LauncherResult<LaunchedGame> {
    let player_name = validate_player_name(player_name)?;
    let session_id = Uuid::new_v4();
    let mut cmd = build_command(layout, version, java, &player_name, session_id, extra_args)?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    info!("Launching {} {} as {}", version.branch, version, player_name);
    debug!("Command (copy/paste): {}", format_command_for_logs(&cmd));

    let pid = spawn_detached(&mut cmd, "game client")?;
    Ok(LaunchedGame { pid, session_id })
}

/// Start the dedicated server script from its own directory.
pub fn start_server(script: &Path) -> LauncherResult<LaunchedServer> {
    if !script.is_file() {
        return Err(LauncherError::CorruptedInstallation {
            path: script.to_path_buf(),
        });
    }

    let mut cmd = server_command(script);
    if let Some(server_dir) = script.parent() {
        cmd.current_dir(server_dir);
    }
    cmd.stdin(Stdio::null());

    info!("Starting dedicated server {:?}", script);
    debug!("Command (copy/paste): {}", format_command_for_logs(&cmd));

    let pid = spawn_detached(&mut cmd, "dedicated server")?;
    Ok(LaunchedServer {
        pid,
        script: script.to_path_buf(),
    })
}

/// Spawn without waiting. A watcher thread reaps the child when it exits.
fn spawn_detached(cmd: &mut Command, what: &'static str) -> LauncherResult<u32> {
    let child = cmd
        .spawn()
        .map_err(|e| LauncherError::LaunchFailed(e.to_string()))?;
    let pid = child.id();
    reap_in_background(child, what);
    Ok(pid)
}

fn reap_in_background(mut child: Child, what: &'static str) {
    let pid = child.id();
    let spawned = std::thread::Builder::new()
        .name(format!("reap-{pid}"))
        .spawn(move || match child.wait() {
            Ok(status) => info!("{} (pid {}) exited with {}", what, pid, status),
            Err(err) => warn!("Lost track of {} (pid {}): {}", what, pid, err),
        });
    if let Err(err) = spawned {
        warn!("Could not watch {} (pid {}): {}", what, pid, err);
    }
}

#[cfg(target_os = "windows")]
fn server_command(script: &Path) -> Command {
    const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(script).creation_flags(CREATE_NEW_CONSOLE);
    cmd
}

#[cfg(not(target_os = "windows"))]
fn server_command(script: &Path) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg(script);
    cmd
}

fn configure_platform_spawn(cmd: &mut Command) {
    #[cfg(target_os = "windows")]
    {
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        cmd.creation_flags(DETACHED_PROCESS);
    }
    #[cfg(not(target_os = "windows"))]
    let _ = cmd;
}

fn format_command_for_logs(cmd: &Command) -> String {
    std::iter::once(cmd.get_program().to_os_string())
        .chain(cmd.get_args().map(|arg| arg.to_os_string()))
        .map(|part: OsString| shell_escape(&part.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }
    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }
    format!("\"{}\"", raw.replace('"', "\\\""))
}

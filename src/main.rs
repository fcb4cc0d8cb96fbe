use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc::UnboundedReceiver;

use hyta_launcher_lib::commands;
use hyta_launcher_lib::core::config::LauncherConfig;
use hyta_launcher_lib::core::error::LauncherError;
use hyta_launcher_lib::core::progress::{Progress, ProgressEvent, Reporter, Status};
use hyta_launcher_lib::core::state::{AppState, SharedState};
use hyta_launcher_lib::{init_console_logging, init_logging};

#[derive(Debug, Parser)]
#[command(name = "hyta-launcher", version, about = "Install, update and launch the game")]
struct Cli {
    /// Release branch (release, pre-release, beta, alpha, ...)
    #[arg(long, short, env = "HYTA_BRANCH", default_value = "release", global = true)]
    branch: String,

    /// Debug-level logging for the launcher itself
    #[arg(long, global = true)]
    verbose: bool,

    /// Download patches from the configured mirror (HYTA_MIRROR_URL)
    #[arg(long, global = true)]
    mirror: bool,

    /// Print progress events as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the versions available on the branch
    Versions,
    /// Install if needed, then start the game
    Launch {
        /// Player name, 3 to 16 characters
        #[arg(long, short, env = "HYTA_PLAYER_NAME")]
        name: String,
        /// `latest` or an artifact id
        #[arg(value_name = "VERSION", default_value = "latest")]
        selector: String,
    },
    /// Delete and install a version again
    Reinstall {
        #[arg(value_name = "VERSION", default_value = "latest")]
        selector: String,
    },
    /// Start the dedicated server of an installed version
    Server,
    /// Show whether a version is installed
    Status {
        #[arg(value_name = "VERSION", default_value = "latest")]
        selector: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = LauncherConfig::from_env();
    config.verbose_logging |= cli.verbose;
    config.use_mirror |= cli.mirror;

    if let Err(err) = init_logging(&config) {
        init_console_logging(&config);
        tracing::warn!("File logging disabled: {}", err);
    }

    let state = match AppState::new(config) {
        Ok(state) => state.shared(),
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let (reporter, rx) = Reporter::channel();
    let printer = tokio::spawn(print_events(rx, cli.json));
    let result = run(&cli, &state, &reporter).await;
    drop(reporter);
    let _ = printer.await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            if err.is_corrupted_installation() {
                eprintln!("hint: run `hyta-launcher reinstall` to repair the installation");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(
    cli: &Cli,
    state: &SharedState,
    reporter: &Reporter,
) -> Result<(), LauncherError> {
    match &cli.command {
        Command::Versions => {
            let versions = commands::check_versions(state, &cli.branch, reporter).await?;
            for version in versions {
                let selector = version.folder_name();
                let installed = state.lock().await.pipeline().is_installed(&version);
                println!(
                    "{:<8} {:<12} {}",
                    selector,
                    version.display_name,
                    if installed { "installed" } else { "" }
                );
            }
        }
        Command::Launch { name, selector } => {
            let launched =
                commands::launch_game(state, &cli.branch, selector, name, reporter).await?;
            println!("started pid {} (session {})", launched.pid, launched.session_id);
        }
        Command::Reinstall { selector } => {
            commands::reinstall_game(state, &cli.branch, selector, reporter).await?;
            println!("reinstalled {} {}", cli.branch, selector);
        }
        Command::Server => {
            let started = commands::start_server(state, &cli.branch).await?;
            println!("server started pid {} ({})", started.pid, started.script.display());
        }
        Command::Status { selector } => {
            let installed = commands::is_game_installed(state, &cli.branch, selector).await?;
            println!(
                "{} {}: {}",
                cli.branch,
                selector,
                if installed { "installed" } else { "not installed" }
            );
        }
    }
    Ok(())
}

async fn print_events(mut rx: UnboundedReceiver<ProgressEvent>, json: bool) {
    let mut last_decile = None;
    while let Some(event) = rx.recv().await {
        if json {
            if let Ok(line) = serde_json::to_string(&event) {
                println!("{line}");
            }
            continue;
        }
        match event {
            ProgressEvent::Status(status) => {
                last_decile = None;
                eprintln!("{}", describe(&status));
            }
            ProgressEvent::Progress(Progress::Percent(value)) => {
                let decile = (value / 10.0).floor() as u8;
                if last_decile != Some(decile) {
                    last_decile = Some(decile);
                    eprintln!("  {:>3.0}%", value);
                }
            }
            ProgressEvent::Progress(Progress::Indeterminate) => {
                eprintln!("  ...");
            }
        }
    }
}

fn describe(status: &Status) -> String {
    match status {
        Status::CheckingVersions { branch } => format!("Checking versions of {branch}"),
        Status::VersionsFound { count } => format!("Found {count} versions"),
        Status::CheckingRuntime => "Checking Java runtime".into(),
        Status::DownloadingRuntime => "Downloading Java runtime".into(),
        Status::ExtractingRuntime => "Extracting Java runtime".into(),
        Status::SystemRuntimeFallback => "Runtime download failed, using system Java".into(),
        Status::CheckingGame => "Checking game files".into(),
        Status::GameInstalled => "Game already installed".into(),
        Status::Downloading { version } => format!("Downloading {version}"),
        Status::PatchCached => "Using cached patch".into(),
        Status::Installing => "Installing".into(),
        Status::DownloadingPatcher => "Downloading patch tool".into(),
        Status::ExtractingPatcher => "Extracting patch tool".into(),
        Status::ApplyingPatch => "Applying patch".into(),
        Status::InstallComplete => "Installation complete".into(),
        Status::Launching => "Launching game".into(),
    }
}

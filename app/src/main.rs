use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use log::{error, info};
use quarry_adapters::clipboard::SystemClipboard;
use quarry_core::settings::{require_config_dir, Settings, LOG_FILE_NAME};
use quarry_core::store::{ConnectionStore, EncryptedFileStore, KdfParams, STORE_FILE_NAME};
use quarry_tui::modal::PasswordPurpose;
use quarry_tui::workspace::Workspace;
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

#[derive(Debug, Parser)]
#[command(name = "quarry", version, about = "Terminal SQL workspace")]
struct Args {
    /// Show the layout debug line and log at debug level.
    #[arg(long)]
    debug: bool,

    /// Log file (defaults to quarry.log in the config directory).
    #[arg(long)]
    log: Option<PathBuf>,

    /// Directory holding the connection store and settings.
    #[arg(long)]
    config_dir: Option<PathBuf>,
}

fn run_app(
    run_tui: impl FnOnce() -> Result<(), quarry_tui::TuiError>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Err(err) = run_tui() {
        error!("terminal session failed: {err}");
        return Err(err.into());
    }
    info!("quarry exited cleanly");
    Ok(())
}

/// Installs the file logger. Failures are reported to the caller, which
/// keeps running without a log.
fn init_logging(path: &Path, debug: bool) -> Result<(), String> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let config = ConfigBuilder::new().set_time_format_rfc3339().build();
    let file = File::create(path)
        .map_err(|err| format!("cannot write log to {}: {err}", path.display()))?;
    WriteLogger::init(level, config, file).map_err(|err| format!("cannot install logger: {err}"))
}

/// Unlocks the store at `path`, or creates it when this is the first run.
/// Returns `None` when the user dismisses the prompt.
fn unlock_store(
    path: &Path,
    kdf: KdfParams,
    prompt: impl FnOnce(PasswordPurpose) -> Result<Option<String>, quarry_tui::TuiError>,
) -> Result<Option<EncryptedFileStore>, Box<dyn std::error::Error>> {
    let first_run = !path.exists();
    let purpose = if first_run {
        PasswordPurpose::Setup
    } else {
        PasswordPurpose::Unlock
    };
    let Some(password) = prompt(purpose)? else {
        return Ok(None);
    };

    let mut store = EncryptedFileStore::new(path, password).with_kdf(kdf);
    store.load()?;
    if first_run {
        store.save()?;
        info!("created connection store at {}", path.display());
    }
    Ok(Some(store))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config_dir = match args.config_dir {
        Some(dir) => dir,
        None => require_config_dir()?,
    };
    fs::create_dir_all(&config_dir)?;

    let log_path = args.log.unwrap_or_else(|| config_dir.join(LOG_FILE_NAME));
    if let Err(message) = init_logging(&log_path, args.debug) {
        eprintln!("quarry: {message}");
    }
    info!("quarry starting with config dir {}", config_dir.display());

    let settings = Settings::load_from_dir(&config_dir)?;
    let store_path = config_dir.join(STORE_FILE_NAME);
    let Some(store) = unlock_store(
        &store_path,
        KdfParams::default(),
        quarry_tui::prompt_master_password,
    )?
    else {
        info!("master password prompt dismissed");
        return Ok(());
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let workspace = Workspace::new(
        Box::new(store),
        quarry_adapters::default_registry(),
        settings,
    )
    .with_debug(args.debug);
    let clipboard = Arc::new(SystemClipboard::new());

    run_app(|| quarry_tui::run(workspace, runtime.handle(), clipboard))
}

//! smb_mount - mount and unmount configured SMB/CIFS shares.

mod logging;
mod ui;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use smb_mount_core::config::{self, Config};
use smb_mount_core::mount::cleanup_mount_point;
use smb_mount_core::status;
use smb_mount_core::{BatchOrchestrator, Mounter, Outcome, ResolvedMount, Result, UnmountMode};
use snafu::{OptionExt, whatever};
use tracing::warn;

/// Manage SMB/CIFS shares declared in a YAML file.
#[derive(Parser)]
#[command(name = "smb_mount")]
#[command(about = "Mount and unmount SMB/CIFS shares", long_about = None)]
struct Cli {
    /// Config file path (default: ~/.config/smb_mount_config.yaml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured shares and their mount status.
    #[command(visible_alias = "l")]
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Mount a share, or choose from a menu when no name is given.
    #[command(visible_alias = "m")]
    Mount { name: Option<String> },

    /// Unmount a share, or choose from the mounted ones when no name is given.
    #[command(visible_aliases = ["u", "unmount"])]
    Umount {
        name: Option<String>,

        /// Lazy unmount, falling back to a forced one.
        #[arg(long)]
        force: bool,

        /// Remove the empty mount directory afterwards.
        #[arg(long)]
        cleanup: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", snafu::Report::from_error(e));
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the command succeeded overall.
fn run(cli: Cli) -> Result<bool> {
    let config = load_config(cli.config)?;
    let mounter = Mounter::new();

    match cli.command {
        Commands::List { json } => list(&config, &mounter, json),
        Commands::Mount { name } => mount(&config, &mounter, name.as_deref()),
        Commands::Umount {
            name,
            force,
            cleanup,
        } => {
            let mode = if force {
                UnmountMode::Force
            } else {
                UnmountMode::Normal
            };
            umount(&config, &mounter, name.as_deref(), mode, cleanup)
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = match path {
        Some(path) => path,
        None => config::default_config_path()
            .whatever_context("cannot determine home directory; pass --config")?,
    };

    let config = Config::load(&path)?;
    for warning in config::check_permissions(&path) {
        eprintln!("Warning: {}", warning);
    }
    Ok(config)
}

/// All entries with paths resolved and live status read.
fn refreshed_entries(config: &Config, mounter: &Mounter) -> Vec<ResolvedMount> {
    let mut entries = config.entries();
    for entry in &mut entries {
        if let Err(e) = entry.resolve(&config.base_dir).map(|_| ()) {
            warn!(entry = %entry.name(), error = %e, "failed to resolve mount path");
        }
    }
    status::refresh_all(&mut entries, |path| mounter.is_mounted(path));
    entries
}

fn list(config: &Config, mounter: &Mounter, json: bool) -> Result<bool> {
    let entries = refreshed_entries(config, mounter);
    let rows: Vec<ui::ListRow> = entries.iter().map(ui::ListRow::from_entry).collect();

    if json {
        let out = whatever!(serde_json::to_string_pretty(&rows), "failed to encode list");
        println!("{}", out);
    } else {
        print!("{}", ui::render_table(&rows));
    }
    Ok(true)
}

/// Picks entries by name or from an interactive menu over those matching
/// `filter`. `None` means nothing to do.
fn choose(
    config: &Config,
    mounter: &Mounter,
    name: Option<&str>,
    prompt: &str,
    filter: impl Fn(&ResolvedMount) -> bool,
) -> Result<Option<Vec<ResolvedMount>>> {
    if let Some(name) = name {
        let declaration = config.find_by_name(name)?;
        return Ok(Some(vec![ResolvedMount::new(declaration.clone())]));
    }

    let candidates: Vec<ResolvedMount> = refreshed_entries(config, mounter)
        .into_iter()
        .filter(|e| filter(e))
        .collect();
    if candidates.is_empty() {
        println!("No shares available");
        return Ok(None);
    }

    let Some(indices) = ui::select_entries(prompt, &candidates)? else {
        println!("Cancelled");
        return Ok(None);
    };
    if indices.is_empty() {
        println!("No shares selected");
        return Ok(None);
    }
    Ok(Some(
        indices.into_iter().map(|i| candidates[i].clone()).collect(),
    ))
}

fn mount(config: &Config, mounter: &Mounter, name: Option<&str>) -> Result<bool> {
    let Some(mut entries) = choose(config, mounter, name, "Select shares to mount", |_| true)?
    else {
        return Ok(true);
    };

    println!("Mounting {} share(s)...\n", entries.len());
    let batch = BatchOrchestrator::new(mounter, config.base_dir.clone());
    let result = batch.mount_many(&mut entries, ui::prompt_password, &mut ui::CliProgress)?;

    ui::print_summary("Mount", &result);
    Ok(result.is_success())
}

fn umount(
    config: &Config,
    mounter: &Mounter,
    name: Option<&str>,
    mode: UnmountMode,
    cleanup: bool,
) -> Result<bool> {
    let Some(mut entries) = choose(config, mounter, name, "Select shares to unmount", |e| {
        e.is_mounted
    })?
    else {
        return Ok(true);
    };

    if let Some(name) = name {
        let entry = &mut entries[0];
        let path = entry.resolve(&config.base_dir)?;
        if !mounter.is_mounted(path)? {
            whatever!("'{}' is not mounted at {}", name, path.display());
        }
    }

    println!("Unmounting {} share(s)...\n", entries.len());
    let batch = BatchOrchestrator::new(mounter, config.base_dir.clone());
    let result = batch.unmount_many(&mut entries, mode, &mut ui::CliProgress);

    if cleanup {
        for outcome in &result.outcomes {
            if let (Outcome::Unmounted { .. }, Some(path)) = (&outcome.outcome, &outcome.path)
                && let Err(e) = cleanup_mount_point(mounter.table(), path)
            {
                eprintln!("Warning: {}", snafu::Report::from_error(e));
            }
        }
    }

    ui::print_summary("Unmount", &result);
    Ok(result.is_success())
}

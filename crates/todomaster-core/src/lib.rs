pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod render;
pub mod storage;
pub mod store;
pub mod task;

use std::ffi::OsString;
use std::io;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

pub use storage::{FileSlot, MemorySlot, Slot, TaskPersistence};
pub use store::{EditSession, TaskStore};
pub use task::{Counts, Task, TaskFilter};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let cli = match cli::GlobalCli::try_parse_from(raw_args) {
        Ok(cli) => cli,
        Err(err) if err.use_stderr() => return Err(err.into()),
        // --help and --version
        Err(err) => err.exit(),
    };

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        "starting todomaster CLI"
    );
    debug!(overrides = ?cli.overrides, "config overrides from the command line");

    let mut cfg = config::Config::load(cli.todorc.as_deref())?;
    cfg.apply_overrides(cli.overrides);

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let slot = FileSlot::open(&data_dir)
        .with_context(|| format!("failed to open data directory {}", data_dir.display()))?;
    let mut store = TaskStore::open(TaskPersistence::with_key(slot, &cfg.storage_key()));

    let renderer = render::Renderer::new(&cfg)?;
    let mut out = io::stdout().lock();
    commands::dispatch(&mut store, &cfg, &renderer, cli.command, &mut out)?;

    info!("done");
    Ok(())
}

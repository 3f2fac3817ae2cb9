use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::task::TaskFilter;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "todo",
    version,
    about = "Todo Master: a small, persistent task list",
    infer_subcommands = true
)]
pub struct GlobalCli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Less log output (-q warn, -qq error)
    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Override a config key for this run, e.g. --rc color=off
    #[arg(long = "rc", value_name = "KEY=VALUE", value_parser = parse_override, global = true)]
    pub overrides: Vec<(String, String)>,

    /// Config file to read instead of $TODORC or ~/.todorc
    #[arg(long = "todorc", global = true)]
    pub todorc: Option<PathBuf>,

    /// Directory holding the saved list
    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Add a task to the top of the list
    Add {
        #[arg(required = true, num_args = 1.., allow_hyphen_values = true)]
        text: Vec<String>,
    },

    /// Show tasks, optionally only active or completed ones
    #[command(alias = "ls")]
    List { filter: Option<TaskFilter> },

    /// Mark a task done, or not done again
    #[command(alias = "done")]
    Toggle { reference: String },

    /// Replace a task's text
    Edit {
        reference: String,
        #[arg(num_args = 0.., allow_hyphen_values = true)]
        text: Vec<String>,
    },

    /// Remove a task
    #[command(alias = "rm")]
    Delete { reference: String },

    /// Show active and completed counts
    Count,

    /// Print the saved list as JSON
    Export,
}

fn parse_override(raw: &str) -> anyhow::Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {raw}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("empty config key in: {raw}"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Quiet wins over verbose; with neither, only warnings are shown.
pub fn log_level(verbose: u8, quiet: u8) -> &'static str {
    match (quiet, verbose) {
        (q, _) if q >= 2 => "error",
        (1, _) | (0, 0) => "warn",
        (0, 1) => "info",
        (0, 2) => "debug",
        _ => "trace",
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level(verbose, quiet))
            .map_err(|e| anyhow!("invalid log filter: {e}"))?,
    };

    let stderr_is_tty = std::io::stderr().is_terminal();
    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(stderr_is_tty)
        .try_init()
    {
        debug!(error = %err, "tracing subscriber already installed");
    }

    Ok(())
}

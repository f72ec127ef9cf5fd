//! Clap derive structures for the `rgbw2` CLI.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// rgbw2 -- keep Shelly RGBW2 white channels in sync
#[derive(Debug, Parser)]
#[command(
    name = "rgbw2",
    version,
    about = "Control and watch Shelly RGBW2 white channels",
    long_about = "Drives Shelly RGBW2 devices in white mode over their local HTTP API.\n\n\
        `run` keeps a cached state per channel in sync with the devices,\n\
        `status` and `set` are one-shot operations.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "RGBW2_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "RGBW2_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Keep configured channels in sync until interrupted
    Run(RunArgs),

    /// Read the state of configured channels
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Switch or dim one channel
    Set(SetArgs),

    /// Inspect the configuration
    Config(ConfigArgs),
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// JSON file holding channel state between runs
    #[arg(long)]
    pub state: Option<PathBuf>,
}

// ── Status ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Only this device (id or host)
    pub device: Option<String>,
}

// ── Set ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["on", "off", "brightness"])
))]
pub struct SetArgs {
    /// Device id or host
    pub device: String,

    /// Channel index (0-3)
    pub channel: i64,

    /// Turn the channel on at its last brightness
    #[arg(long)]
    pub on: bool,

    /// Turn the channel off
    #[arg(long)]
    pub off: bool,

    /// Set brightness (0-100, 0 turns the channel off)
    #[arg(long, short = 'b', allow_negative_numbers = true)]
    pub brightness: Option<f64>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Print the resolved configuration (passwords redacted)
    Show,
}

// src/cli.rs

use clap::{Parser, ValueEnum};

/// Unattended data-file shipping and declaration daemon.
#[derive(Debug, Parser)]
#[command(name = "shipd", version, about)]
pub struct CliArgs {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "Shipd.toml")]
    pub config: String,

    /// Log level (overrides the SHIPD_LOG environment variable).
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Print the effective configuration and exit without scanning.
    #[arg(long)]
    pub dry_run: bool,

    /// Start with scanning and dispatch held; release via the control
    /// surface.
    #[arg(long)]
    pub held: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

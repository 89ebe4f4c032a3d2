use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use super::commands::timestamp::TimestampArgs;
use super::commands::verify::VerifyArgs;

#[derive(Parser)]
#[command(
    name = "xroad-verify",
    version,
    about = "Offline verification of X-Road message signatures and timestamp tokens"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Verify a message signature for a claimed signer
    Verify(VerifyArgs),
    /// Verify an RFC 3161 timestamp token
    Timestamp(TimestampArgs),
    Version,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Options shared by the verification commands.
#[derive(clap::Args, Debug, Clone)]
pub struct CommonArgs {
    /// Trust configuration (YAML)
    #[arg(long, env = "XROAD_VERIFY_CONFIG")]
    pub config: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Quiet mode - only exit code, no output
    #[arg(long, short)]
    pub quiet: bool,
}

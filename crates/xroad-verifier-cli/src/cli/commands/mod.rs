pub mod timestamp;
pub mod verify;

use serde::Serialize;
use xroad_verifier::{ErrorKind, VerificationError};

use super::args::{Cli, Command, CommonArgs, OutputFormat};
use crate::exit_codes::{INPUT_ERROR, SUCCESS};

pub fn dispatch(cli: Cli) -> i32 {
    match cli.cmd {
        Command::Verify(args) => verify::cmd_verify(args),
        Command::Timestamp(args) => timestamp::cmd_timestamp(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            SUCCESS
        }
    }
}

/// JSON outcome printed with `--format json`.
#[derive(Debug, Serialize)]
pub(crate) struct Outcome {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Print the outcome of `result` and pick the exit code.
///
/// Errors that are not a [`VerificationError`] (unreadable input, bad
/// configuration) exit with [`INPUT_ERROR`].
pub(crate) fn report(
    common: &CommonArgs,
    result: anyhow::Result<serde_json::Map<String, serde_json::Value>>,
    success_line: impl FnOnce(&serde_json::Map<String, serde_json::Value>) -> String,
) -> i32 {
    match result {
        Ok(extra) => {
            if !common.quiet {
                match common.format {
                    OutputFormat::Text => println!("{}", success_line(&extra)),
                    OutputFormat::Json => print_json(&Outcome {
                        verified: true,
                        kind: None,
                        detail: None,
                        extra,
                    }),
                }
            }
            SUCCESS
        }
        Err(e) => {
            let verification = e.downcast_ref::<VerificationError>();
            if !common.quiet {
                match (common.format, verification) {
                    (OutputFormat::Json, Some(err)) => print_json(&Outcome {
                        verified: false,
                        kind: Some(err.kind()),
                        detail: Some(err.detail()),
                        extra: serde_json::Map::new(),
                    }),
                    _ => eprintln!("error: {e:#}"),
                }
            }
            verification.map_or(INPUT_ERROR, VerificationError::exit_code)
        }
    }
}

fn print_json(outcome: &Outcome) {
    match serde_json::to_string_pretty(outcome) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("error: failed to serialize outcome: {e}"),
    }
}

//! `xroad-verify timestamp` - verify an RFC 3161 timestamp token.

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use clap::Args;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::PathBuf;

use xroad_verifier::timestamp::{self, TimestampToken};
use xroad_verifier::trust::load_certificate;
use xroad_verifier::{StaticTrustConfiguration, TrustConfiguration, VerificationError};

use crate::cli::args::CommonArgs;

#[derive(Args, Debug)]
pub struct TimestampArgs {
    /// Timestamp token (DER)
    pub token: PathBuf,

    /// Stamped data; without it only the token signer is checked
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Additional trusted TSP certificate (repeatable)
    #[arg(long = "tsp-cert")]
    pub tsp_certs: Vec<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub fn cmd_timestamp(args: TimestampArgs) -> i32 {
    let result = run_timestamp(&args);
    super::report(&args.common, result, |extra| {
        format!(
            "Timestamp verified: genTime {} (TSP: {})",
            extra.get("gen_time").and_then(Value::as_str).unwrap_or_default(),
            extra.get("tsp").and_then(Value::as_str).unwrap_or_default()
        )
    })
}

fn run_timestamp(args: &TimestampArgs) -> Result<Map<String, Value>> {
    let conf = StaticTrustConfiguration::from_file(&args.common.config)?;
    let mut tsp_certs = conf.tsp_certs().to_vec();
    for path in &args.tsp_certs {
        tsp_certs.push(load_certificate(path)?);
    }

    let der = fs::read(&args.token)
        .with_context(|| format!("failed to read timestamp token: {}", args.token.display()))?;
    let token = TimestampToken::from_der(&der)
        .map_err(|e| VerificationError::malformed(e.to_string()))?;

    match &args.data {
        Some(path) => {
            let data = fs::read(path)
                .with_context(|| format!("failed to read stamped data: {}", path.display()))?;
            timestamp::verify(&token, &data, &tsp_certs)?;
        }
        None => timestamp::verify_token(&token, &tsp_certs)?,
    }

    let tsp = timestamp::signer_certificate(&token, &tsp_certs)?;
    let mut extra = Map::new();
    extra.insert(
        "gen_time".into(),
        json!(token.gen_time().to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
    extra.insert("tsp".into(), json!(tsp.subject()));
    Ok(extra)
}

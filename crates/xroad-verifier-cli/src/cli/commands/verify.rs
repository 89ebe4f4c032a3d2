//! `xroad-verify verify` - verify a message signature for a claimed signer.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Args;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use xroad_verifier::message_part::{attachment, MESSAGE};
use xroad_verifier::{
    ClientId, DigestAlgorithm, MessagePart, OcspCertChainVerifier, Signature, SignatureVerifier,
    StaticTrustConfiguration,
};

use crate::cli::args::CommonArgs;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Signature document (asic:XAdESSignatures XML)
    #[arg(long)]
    pub signature: PathBuf,

    /// Claimed signer, INSTANCE/CLASS/CODE[/SUBSYSTEM]
    #[arg(long)]
    pub signer: ClientId,

    /// SOAP message covered by the signature
    #[arg(long)]
    pub message: Option<PathBuf>,

    /// Attachment, in order (repeatable)
    #[arg(long = "attachment")]
    pub attachments: Vec<PathBuf>,

    /// Digest algorithm of the message parts
    #[arg(long, default_value = "SHA-256", value_parser = parse_digest_algorithm)]
    pub digest_algorithm: DigestAlgorithm,

    /// Hash chain result of a batch signature
    #[arg(long, requires = "hash_chain")]
    pub hash_chain_result: Option<PathBuf>,

    /// Hash chain of a batch signature
    #[arg(long)]
    pub hash_chain: Option<PathBuf>,

    /// Verification time (RFC 3339); defaults to now
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,

    /// Skip signature structure validation (older signature formats)
    #[arg(long)]
    pub no_schema: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub fn cmd_verify(args: VerifyArgs) -> i32 {
    let result = run_verify(&args);
    super::report(&args.common, result, |extra| {
        format!(
            "Signature verified for {} (signing certificate: {})",
            args.signer,
            extra
                .get("signing_certificate")
                .and_then(Value::as_str)
                .unwrap_or_default()
        )
    })
}

fn run_verify(args: &VerifyArgs) -> Result<Map<String, Value>> {
    let conf = StaticTrustConfiguration::from_file(&args.common.config)?;
    let chain_verifier = OcspCertChainVerifier::new(&conf);
    let at = args.at.unwrap_or_else(Utc::now);

    let xml = fs::read_to_string(&args.signature)
        .with_context(|| format!("failed to read signature: {}", args.signature.display()))?;
    let signature = Signature::parse(&xml)?;

    let mut verifier = SignatureVerifier::new(&conf, &chain_verifier, signature);
    if let Some(path) = &args.hash_chain_result {
        verifier = verifier.with_hash_chain_result(read(path, "hash chain result")?);
    }
    if let Some(path) = &args.hash_chain {
        verifier = verifier.with_hash_chain(read(path, "hash chain")?);
    }
    if let Some(path) = &args.message {
        verifier.add_part(MessagePart::with_data(
            MESSAGE,
            args.digest_algorithm,
            read(path, "message")?,
        ));
    }
    for (i, path) in args.attachments.iter().enumerate() {
        verifier.add_part(MessagePart::with_data(
            attachment(i + 1),
            args.digest_algorithm,
            read(path, "attachment")?,
        ));
    }
    verifier.set_verify_schema(!args.no_schema);

    tracing::info!(signer = %args.signer, %at, "verifying signature");
    verifier.verify(&args.signer, at)?;

    let signing_cert = verifier.signing_certificate()?;
    let mut extra = Map::new();
    extra.insert("signer".into(), json!(args.signer.to_string()));
    extra.insert(
        "at".into(),
        json!(at.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
    extra.insert("signing_certificate".into(), json!(signing_cert.subject()));
    Ok(extra)
}

fn read(path: &Path, what: &str) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}: {}", what, path.display()))
}

fn parse_digest_algorithm(name: &str) -> Result<DigestAlgorithm, String> {
    DigestAlgorithm::from_name(name).ok_or_else(|| format!("unsupported digest algorithm: {name}"))
}

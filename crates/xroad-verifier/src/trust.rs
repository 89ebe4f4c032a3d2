//! Trust configuration.
//!
//! The verifier consults a [`TrustConfiguration`] for everything that is a
//! deployment decision rather than evidence:
//!
//! - CA trust anchors per instance
//! - Sign-certificate profiles (subject name to participant identifier)
//! - Authorized OCSP responders and freshness policy
//! - Trusted timestamping provider certificates
//!
//! [`StaticTrustConfiguration`] implements it from YAML:
//!
//! ```yaml
//! ocsp_freshness_seconds: 3600
//! verify_ocsp_next_update: true
//! instances:
//!   EE:
//!     sign_cert_profile: dn_fields
//!     ca_certs: [ca.pem]
//!     ocsp_responders: [ocsp.pem]
//! tsp_certs: [tsa.pem]
//! ```
//!
//! Certificate paths are resolved relative to the YAML file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cert::Certificate;
use crate::error::{VerificationError, VerificationResult};
use crate::identifier::ClientId;
use crate::profile::{SignCertProfileKind, SignCertificateProfile};

/// Default OCSP freshness window.
pub const DEFAULT_OCSP_FRESHNESS_SECONDS: u64 = 3600;

/// Trust decisions the verifier delegates to the deployment.
pub trait TrustConfiguration {
    /// Participant identifier encoded in `cert`, per the instance's profile.
    fn subject_client_id(&self, signer: &ClientId, cert: &Certificate)
        -> VerificationResult<ClientId>;

    /// CA certificates configured for `instance`.
    fn ca_certs(&self, instance: &str) -> &[Certificate];

    /// Configured CA that issued `cert`.
    fn ca_cert(&self, instance: &str, cert: &Certificate) -> Option<&Certificate> {
        self.ca_certs(instance)
            .iter()
            .find(|ca| ca.subject_raw() == cert.issuer_raw() && cert.verify_issued_by(ca).is_ok())
    }

    /// All configured OCSP responder certificates.
    fn ocsp_responder_certs(&self) -> &[Certificate];

    /// Whether `responder` is configured to answer for CA `issuer`.
    fn is_ocsp_responder(&self, issuer: &Certificate, responder: &Certificate) -> bool;

    fn ocsp_freshness_seconds(&self) -> u64 {
        DEFAULT_OCSP_FRESHNESS_SECONDS
    }

    fn verify_ocsp_next_update(&self) -> bool {
        true
    }

    /// Trusted timestamping provider certificates.
    fn tsp_certs(&self) -> &[Certificate];
}

/// YAML form of the trust configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfigFile {
    #[serde(default = "default_freshness")]
    pub ocsp_freshness_seconds: u64,

    #[serde(default = "default_true")]
    pub verify_ocsp_next_update: bool,

    #[serde(default)]
    pub instances: BTreeMap<String, InstanceConfigFile>,

    /// Paths to trusted TSP certificates.
    #[serde(default)]
    pub tsp_certs: Vec<PathBuf>,
}

/// Per-instance section of [`TrustConfigFile`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceConfigFile {
    #[serde(default)]
    pub sign_cert_profile: SignCertProfileKind,

    #[serde(default)]
    pub ca_certs: Vec<PathBuf>,

    #[serde(default)]
    pub ocsp_responders: Vec<PathBuf>,
}

fn default_freshness() -> u64 {
    DEFAULT_OCSP_FRESHNESS_SECONDS
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default)]
struct InstanceTrust {
    profile: SignCertProfileKind,
    ca_certs: Vec<Certificate>,
    ocsp_responders: Vec<Certificate>,
}

/// In-memory trust configuration.
#[derive(Debug, Clone)]
pub struct StaticTrustConfiguration {
    instances: BTreeMap<String, InstanceTrust>,
    responders: Vec<Certificate>,
    tsp_certs: Vec<Certificate>,
    ocsp_freshness_seconds: u64,
    verify_ocsp_next_update: bool,
}

impl Default for StaticTrustConfiguration {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticTrustConfiguration {
    pub fn new() -> Self {
        Self {
            instances: BTreeMap::new(),
            responders: Vec::new(),
            tsp_certs: Vec::new(),
            ocsp_freshness_seconds: DEFAULT_OCSP_FRESHNESS_SECONDS,
            verify_ocsp_next_update: true,
        }
    }

    /// Load from a YAML file; certificate paths are relative to its directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read trust configuration: {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_yaml(&content, base)
    }

    /// Parse YAML; certificate paths are relative to `base_dir`.
    pub fn from_yaml(yaml: &str, base_dir: &Path) -> Result<Self> {
        let file: TrustConfigFile =
            serde_yaml::from_str(yaml).context("failed to parse trust configuration YAML")?;
        Self::from_config(&file, base_dir)
    }

    pub fn from_config(file: &TrustConfigFile, base_dir: &Path) -> Result<Self> {
        let mut conf = Self::new()
            .with_ocsp_freshness_seconds(file.ocsp_freshness_seconds)
            .with_verify_ocsp_next_update(file.verify_ocsp_next_update);

        for (instance, section) in &file.instances {
            conf = conf.with_instance(instance, section.sign_cert_profile);
            for path in &section.ca_certs {
                conf = conf.with_ca_cert(instance, load_certificate(&base_dir.join(path))?);
            }
            for path in &section.ocsp_responders {
                conf = conf.with_ocsp_responder(instance, load_certificate(&base_dir.join(path))?);
            }
        }
        for path in &file.tsp_certs {
            conf = conf.with_tsp_cert(load_certificate(&base_dir.join(path))?);
        }

        tracing::debug!(
            instances = conf.instances.len(),
            tsp_certs = conf.tsp_certs.len(),
            "loaded trust configuration"
        );
        Ok(conf)
    }

    /// Register `instance` with a sign-certificate profile.
    pub fn with_instance(mut self, instance: &str, profile: SignCertProfileKind) -> Self {
        self.instances.entry(instance.to_string()).or_default().profile = profile;
        self
    }

    pub fn with_ca_cert(mut self, instance: &str, cert: Certificate) -> Self {
        self.instances
            .entry(instance.to_string())
            .or_default()
            .ca_certs
            .push(cert);
        self
    }

    pub fn with_ocsp_responder(mut self, instance: &str, cert: Certificate) -> Self {
        self.responders.push(cert.clone());
        self.instances
            .entry(instance.to_string())
            .or_default()
            .ocsp_responders
            .push(cert);
        self
    }

    pub fn with_tsp_cert(mut self, cert: Certificate) -> Self {
        self.tsp_certs.push(cert);
        self
    }

    pub fn with_ocsp_freshness_seconds(mut self, seconds: u64) -> Self {
        self.ocsp_freshness_seconds = seconds;
        self
    }

    pub fn with_verify_ocsp_next_update(mut self, verify: bool) -> Self {
        self.verify_ocsp_next_update = verify;
        self
    }
}

impl TrustConfiguration for StaticTrustConfiguration {
    fn subject_client_id(
        &self,
        signer: &ClientId,
        cert: &Certificate,
    ) -> VerificationResult<ClientId> {
        let trust = self.instances.get(&signer.instance).ok_or_else(|| {
            VerificationError::incorrect_certificate(format!(
                "No trust configuration for instance {}",
                signer.instance
            ))
        })?;
        trust.profile.subject_identifier(signer, cert)
    }

    fn ca_certs(&self, instance: &str) -> &[Certificate] {
        self.instances
            .get(instance)
            .map(|t| t.ca_certs.as_slice())
            .unwrap_or(&[])
    }

    fn ocsp_responder_certs(&self) -> &[Certificate] {
        &self.responders
    }

    fn is_ocsp_responder(&self, issuer: &Certificate, responder: &Certificate) -> bool {
        self.instances
            .values()
            .filter(|t| t.ca_certs.contains(issuer))
            .any(|t| t.ocsp_responders.contains(responder))
    }

    fn ocsp_freshness_seconds(&self) -> u64 {
        self.ocsp_freshness_seconds
    }

    fn verify_ocsp_next_update(&self) -> bool {
        self.verify_ocsp_next_update
    }

    fn tsp_certs(&self) -> &[Certificate] {
        &self.tsp_certs
    }
}

/// Read a PEM or DER certificate from disk.
pub fn load_certificate(path: &Path) -> Result<Certificate> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read certificate: {}", path.display()))?;
    Certificate::from_pem_or_der(&bytes)
        .with_context(|| format!("failed to parse certificate: {}", path.display()))
}

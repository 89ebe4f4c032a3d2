//! Signature verification orchestrator.
//!
//! [`SignatureVerifier`] binds one parsed [`Signature`] to the message parts
//! it is supposed to cover and runs the full verification protocol against a
//! claimed signer.
//!
//! # Verification Steps
//!
//! 1. Validate the signature structure (unless disabled)
//! 2. Verify the hash chain, if the signature covers a hash chain result
//! 3. Extract the signing certificate
//! 4. Check the signer name against the certificate subject
//! 5. Verify `SignatureValue` and every `SignedInfo` reference
//! 6. Verify timestamp manifests
//! 7. Verify the certificate chain against the embedded OCSP evidence
//!
//! Every step is a gate: the first failure is returned and later steps do
//! not run. A verifier holds no state shared with other instances; build one
//! per verification job.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::cert::Certificate;
use crate::certchain::CertChainVerifier;
use crate::digest::DigestValue;
use crate::error::{VerificationError, VerificationResult};
use crate::hashchain::HashChainVerifier;
use crate::identifier::ClientId;
use crate::message_part::{MessagePart, SIG_HASH_CHAIN_RESULT};
use crate::resolver::{
    HashChainResolver, LayeredResolver, ReferenceResolver, SignatureResourceResolver,
};
use crate::signature::{schema, xmldsig, Signature};
use crate::trust::TrustConfiguration;

/// Verifies one signature for one claimed signer.
pub struct SignatureVerifier<'a> {
    conf: &'a dyn TrustConfiguration,
    chain_verifier: &'a dyn CertChainVerifier,
    signature: Signature<'a>,
    parts: Vec<MessagePart>,
    hash_chain_result: Option<Vec<u8>>,
    hash_chain: Option<Vec<u8>>,
    signature_resolver: Option<Box<dyn ReferenceResolver + 'a>>,
    hash_chain_resolver: Option<Box<dyn ReferenceResolver + 'a>>,
    verify_schema: bool,
}

impl<'a> SignatureVerifier<'a> {
    pub fn new(
        conf: &'a dyn TrustConfiguration,
        chain_verifier: &'a dyn CertChainVerifier,
        signature: Signature<'a>,
    ) -> Self {
        Self {
            conf,
            chain_verifier,
            signature,
            parts: Vec::new(),
            hash_chain_result: None,
            hash_chain: None,
            signature_resolver: None,
            hash_chain_resolver: None,
            verify_schema: true,
        }
    }

    /// Hash chain result document of a batch signature.
    pub fn with_hash_chain_result(mut self, hash_chain_result: impl Into<Vec<u8>>) -> Self {
        self.hash_chain_result = Some(hash_chain_result.into());
        self
    }

    /// Hash chain document served as `/hashchain.xml`.
    pub fn with_hash_chain(mut self, hash_chain: impl Into<Vec<u8>>) -> Self {
        self.hash_chain = Some(hash_chain.into());
        self
    }

    pub fn signature(&self) -> &Signature<'a> {
        &self.signature
    }

    pub fn add_part(&mut self, part: MessagePart) {
        self.parts.push(part);
    }

    pub fn add_parts(&mut self, parts: impl IntoIterator<Item = MessagePart>) {
        self.parts.extend(parts);
    }

    /// Resolver consulted before the defaults when checking signature references.
    pub fn set_signature_resource_resolver(&mut self, resolver: impl ReferenceResolver + 'a) {
        self.signature_resolver = Some(Box::new(resolver));
    }

    /// Resolver consulted before the defaults when verifying the hash chain.
    pub fn set_hash_chain_resolver(&mut self, resolver: impl ReferenceResolver + 'a) {
        self.hash_chain_resolver = Some(Box::new(resolver));
    }

    /// Structure validation is on by default. Turning it off is meant for
    /// older signature formats and is left to the caller.
    pub fn set_verify_schema(&mut self, verify_schema: bool) {
        self.verify_schema = verify_schema;
    }

    /// Signing certificate from `ds:KeyInfo`, required to be a signing certificate.
    pub fn signing_certificate(&self) -> VerificationResult<Certificate> {
        let cert = self.signature.signing_certificate()?.ok_or_else(|| {
            VerificationError::malformed("Signature does not contain signing certificate")
        })?;
        if !cert.is_signing_cert() {
            return Err(VerificationError::malformed(format!(
                "Certificate {} is not a signing certificate",
                cert.subject()
            )));
        }
        Ok(cert)
    }

    /// Verify that `signer` produced the signature, with certificates and
    /// OCSP evidence evaluated at `at`.
    pub fn verify(&self, signer: &ClientId, at: DateTime<Utc>) -> VerificationResult<()> {
        // 1. Structure
        if self.verify_schema {
            tracing::debug!("validating signature structure");
            schema::validate(&self.signature)?;
        }

        // 2. Hash chain
        if let Some(hash_chain_result) = &self.hash_chain_result {
            if self.signature.references(SIG_HASH_CHAIN_RESULT) {
                tracing::debug!(parts = self.parts.len(), "verifying hash chain");
                self.verify_hash_chain(hash_chain_result)?;
            }
        }

        // 3. Signing certificate
        let signing_cert = self.signing_certificate()?;
        tracing::debug!(subject = %signing_cert.subject(), "extracted signing certificate");

        // 4. Signer name
        self.verify_signer_name(signer, &signing_cert)?;

        // 5. Signature value
        tracing::debug!("verifying signature value");
        let resolver = self.signature_resolver();
        xmldsig::verify_signature_value(&self.signature, &signing_cert, resolver.as_ref())?;

        // 6. Timestamp manifests
        for manifest in self.signature.timestamp_manifests()? {
            let id = manifest.attribute("Id").unwrap_or_default();
            tracing::debug!(manifest = id, "verifying timestamp manifest");
            xmldsig::verify_manifest(&self.signature, manifest)?;
        }

        // 7. Certificate chain
        tracing::debug!(instance = %signer.instance, %at, "verifying certificate chain");
        let extra_certs = self.signature.extra_certificates()?;
        let ocsp_responses = self.signature.ocsp_responses()?;
        self.chain_verifier
            .verify(&signer.instance, &signing_cert, &extra_certs, &ocsp_responses, at)
            .map_err(|e| {
                tracing::warn!(error = %e, "certificate chain verification failed");
                VerificationError::CertChain(e)
            })?;

        tracing::debug!(%signer, "signature verified");
        Ok(())
    }

    fn verify_hash_chain(&self, hash_chain_result: &[u8]) -> VerificationResult<()> {
        let defaults = HashChainResolver::new(self.hash_chain.as_deref());
        let resolver: Box<dyn ReferenceResolver + '_> = match &self.hash_chain_resolver {
            Some(custom) => Box::new(LayeredResolver::new(custom.as_ref(), defaults)),
            None => Box::new(defaults),
        };

        HashChainVerifier::verify(hash_chain_result, resolver.as_ref(), self.hash_chain_inputs())
            .map_err(|e| {
                tracing::warn!(error = %e, "hash chain verification failed");
                VerificationError::malformed(format!("hash chain verification failed: {}", e))
            })
    }

    fn hash_chain_inputs(&self) -> BTreeMap<String, Option<DigestValue>> {
        self.parts
            .iter()
            .map(|part| (part.name.clone(), part.digest()))
            .collect()
    }

    fn verify_signer_name(&self, signer: &ClientId, cert: &Certificate) -> VerificationResult<()> {
        let in_cert = self.conf.subject_client_id(signer, cert)?;
        if !signer.member_equals(&in_cert) {
            tracing::warn!(%signer, certificate = %in_cert, "signer name mismatch");
            return Err(VerificationError::incorrect_certificate(format!(
                "Name in certificate ({}) does not match name in message ({})",
                in_cert, signer
            )));
        }
        Ok(())
    }

    fn signature_resolver(&self) -> Box<dyn ReferenceResolver + '_> {
        let defaults =
            SignatureResourceResolver::new(&self.parts, self.hash_chain_result.as_deref());
        match &self.signature_resolver {
            Some(custom) => Box::new(LayeredResolver::new(custom.as_ref(), defaults)),
            None => Box::new(defaults),
        }
    }
}

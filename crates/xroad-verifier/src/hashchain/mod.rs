//! Hash chain verification.
//!
//! A hash chain lets one XML signature cover many independently transmitted
//! message parts. The signature covers a small *hash chain result* document
//! that names the last step of a chain and its digest; each step is the DER
//! `DigestList` of its inputs (inline digests, digests of other steps, or
//! digests of referenced data).
//!
//! # Verification Steps
//!
//! 1. Parse the hash chain result
//! 2. Recompute the referenced step, recursively resolving step and data refs
//! 3. Compare the digest of the step output to the declared result digest
//! 4. Require every supplied input to have been referenced by the chain

mod digest_list;
mod model;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

pub use digest_list::concat_digests;
pub use model::{
    parse_hash_chain, parse_hash_chain_result, HashChain, HashChainResult, HashStep, StepValue,
    NS_HASHCHAIN,
};

use crate::digest::{DigestAlgorithm, DigestValue};
use crate::resolver::ReferenceResolver;
use crate::xml::c14n;

/// Hash chain failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashChainError {
    /// Document does not have the expected structure.
    #[error("malformed hash chain: {reason}")]
    MalformedHashChain { reason: String },

    /// Referenced content could not be resolved.
    #[error("Cannot resolve URI: {uri}")]
    InvalidReference { uri: String },

    /// Digest of referenced data differs from the one in the chain.
    #[error("Invalid digest value in hash chain reference to {uri}")]
    InvalidHashChainRef { uri: String },

    /// Chain output differs from the signed result.
    #[error("Hash chain result does not match hash chain calculation")]
    InvalidHashChainResult,

    /// Inputs that the chain never referenced.
    #[error("Some inputs were not referenced by hash chain: {}", .inputs.join(", "))]
    UnusedInputs { inputs: Vec<String> },
}

impl HashChainError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedHashChain {
            reason: reason.into(),
        }
    }
}

/// Verifies a set of inputs against a hash chain result.
///
/// Inputs map part names to their digests. A `None` digest means the data
/// has to be fetched through the resolver; the part still counts as an
/// input that the chain must reference.
pub struct HashChainVerifier<'r> {
    resolver: &'r dyn ReferenceResolver,
    inputs: BTreeMap<String, Option<DigestValue>>,
    /// Chains fetched so far in this run, by base URI.
    cache: HashMap<String, Rc<HashChain>>,
    used_inputs: BTreeSet<String>,
    in_progress: BTreeSet<String>,
}

impl<'r> HashChainVerifier<'r> {
    /// Verify `hash_chain_result` against `inputs`.
    pub fn verify(
        hash_chain_result: &[u8],
        resolver: &'r dyn ReferenceResolver,
        inputs: BTreeMap<String, Option<DigestValue>>,
    ) -> Result<(), HashChainError> {
        let mut verifier = Self {
            resolver,
            inputs,
            cache: HashMap::new(),
            used_inputs: BTreeSet::new(),
            in_progress: BTreeSet::new(),
        };
        verifier.run(hash_chain_result)
    }

    fn run(&mut self, hash_chain_result: &[u8]) -> Result<(), HashChainError> {
        // 1. Parse result
        let result = parse_hash_chain_result(hash_chain_result)?;
        tracing::debug!(uri = %result.uri, "verifying hash chain result");

        // 2. Recompute the last step
        let step_output = self.resolve_hash_step(&result.uri, None)?;

        // 3. Compare
        if !result.digest.matches(&step_output) {
            return Err(HashChainError::InvalidHashChainResult);
        }

        // 4. Every input referenced
        let unused: Vec<String> = self
            .inputs
            .keys()
            .filter(|name| !self.used_inputs.contains(*name))
            .cloned()
            .collect();
        if !unused.is_empty() {
            return Err(HashChainError::UnusedInputs { inputs: unused });
        }

        Ok(())
    }

    /// DER `DigestList` of the step at `uri`.
    fn resolve_hash_step(
        &mut self,
        uri: &str,
        current: Option<Rc<HashChain>>,
    ) -> Result<Vec<u8>, HashChainError> {
        let (chain, step_id) = self.fetch_chain(uri, current)?;
        let step = chain
            .step(&step_id)
            .ok_or_else(|| HashChainError::malformed(format!("Hash step not found: {}", uri)))?
            .clone();

        let key = format!("{:p}#{}", Rc::as_ptr(&chain), step_id);
        if !self.in_progress.insert(key.clone()) {
            return Err(HashChainError::malformed(format!(
                "Hash step references itself: {}",
                uri
            )));
        }

        let mut digests = Vec::with_capacity(step.values.len());
        for value in &step.values {
            digests.push(self.resolve_value(value, &chain)?);
        }
        self.in_progress.remove(&key);

        concat_digests(&digests)
            .map_err(|e| HashChainError::malformed(format!("Encoding hash step failed: {}", e)))
    }

    /// Split `base#STEP`, fetching `base` (or reusing the current chain when empty).
    fn fetch_chain(
        &mut self,
        uri: &str,
        current: Option<Rc<HashChain>>,
    ) -> Result<(Rc<HashChain>, String), HashChainError> {
        let (base, fragment) = uri
            .split_once('#')
            .filter(|(_, fragment)| !fragment.is_empty())
            .ok_or_else(|| HashChainError::malformed(format!("Invalid hash step URI: {}", uri)))?;

        let chain = if base.is_empty() {
            current.ok_or_else(|| {
                HashChainError::malformed(format!("Invalid hash step URI: {}", uri))
            })?
        } else if let Some(cached) = self.cache.get(base) {
            Rc::clone(cached)
        } else {
            let data = self
                .resolver
                .resolve(base)
                .ok_or_else(|| HashChainError::InvalidReference {
                    uri: base.to_string(),
                })?;
            let chain = Rc::new(parse_hash_chain(&data)?);
            self.cache.insert(base.to_string(), Rc::clone(&chain));
            chain
        };

        Ok((chain, fragment.to_string()))
    }

    fn resolve_value(
        &mut self,
        value: &StepValue,
        chain: &Rc<HashChain>,
    ) -> Result<DigestValue, HashChainError> {
        let algorithm = value_digest_method(value, chain)?;
        match value {
            StepValue::HashValue { digest_value, .. } => {
                Ok(DigestValue::new(algorithm, digest_value.clone()))
            }
            StepValue::StepRef { uri, .. } => {
                let output = self.resolve_hash_step(uri, Some(Rc::clone(chain)))?;
                Ok(DigestValue::compute(algorithm, &output))
            }
            StepValue::DataRef {
                uri,
                transforms,
                digest_value,
                ..
            } => self.resolve_data_ref(uri, transforms, algorithm, digest_value),
        }
    }

    fn resolve_data_ref(
        &mut self,
        uri: &str,
        transforms: &[c14n::CanonicalizationMethod],
        algorithm: DigestAlgorithm,
        declared: &[u8],
    ) -> Result<DigestValue, HashChainError> {
        if self.inputs.contains_key(uri) {
            self.used_inputs.insert(uri.to_string());
        }

        // A supplied input with the same algorithm is authoritative.
        if let Some(Some(input)) = self.inputs.get(uri) {
            if input.algorithm == algorithm {
                if input.value != declared {
                    tracing::warn!(reference = %uri, "input digest differs from hash chain");
                    return Err(HashChainError::InvalidHashChainRef {
                        uri: uri.to_string(),
                    });
                }
                return Ok(input.clone());
            }
        }

        let declared_digest = DigestValue::new(algorithm, declared.to_vec());
        if !self.resolver.should_resolve(uri, &declared_digest) {
            return Ok(declared_digest);
        }

        let data = self
            .resolver
            .resolve(uri)
            .ok_or_else(|| HashChainError::InvalidReference {
                uri: uri.to_string(),
            })?;
        let data = apply_transforms(uri, data, transforms)?;

        let computed = DigestValue::compute(algorithm, &data);
        if computed.value != declared {
            tracing::warn!(reference = %uri, "hash chain reference digest mismatch");
            return Err(HashChainError::InvalidHashChainRef {
                uri: uri.to_string(),
            });
        }
        Ok(computed)
    }
}

fn value_digest_method(
    value: &StepValue,
    chain: &HashChain,
) -> Result<DigestAlgorithm, HashChainError> {
    value
        .digest_method()
        .or(chain.default_digest_method)
        .ok_or_else(|| HashChainError::malformed("No digest method and no default digest method"))
}

fn apply_transforms(
    uri: &str,
    data: Vec<u8>,
    transforms: &[c14n::CanonicalizationMethod],
) -> Result<Vec<u8>, HashChainError> {
    let mut data = data;
    for method in transforms {
        let text = std::str::from_utf8(&data).map_err(|e| {
            HashChainError::malformed(format!("Transform input {} is not UTF-8: {}", uri, e))
        })?;
        data = c14n::canonicalize_document(text, method).map_err(|e| {
            HashChainError::malformed(format!("Transform of {} failed: {}", uri, e))
        })?;
    }
    Ok(data)
}

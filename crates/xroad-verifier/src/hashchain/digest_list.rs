//! DER `DigestList`: the byte form of one hash step.
//!
//! ```text
//! DigestList ::= SEQUENCE OF DigestInfo
//! DigestInfo ::= SEQUENCE { digestAlgorithm AlgorithmIdentifier, digest OCTET STRING }
//! ```

use der::asn1::{Any, OctetString};
use der::{Encode, Sequence, Tag};
use spki::AlgorithmIdentifierOwned;

use crate::digest::DigestValue;

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct DigestInfo {
    digest_algorithm: AlgorithmIdentifierOwned,
    digest: OctetString,
}

/// DER encoding of the digests, in order.
pub fn concat_digests(digests: &[DigestValue]) -> Result<Vec<u8>, der::Error> {
    let list = digests
        .iter()
        .map(|d| {
            Ok(DigestInfo {
                digest_algorithm: AlgorithmIdentifierOwned {
                    oid: d.algorithm.oid(),
                    parameters: Some(Any::new(Tag::Null, Vec::<u8>::new())?),
                },
                digest: OctetString::new(d.value.clone())?,
            })
        })
        .collect::<Result<Vec<_>, der::Error>>()?;
    list.to_der()
}

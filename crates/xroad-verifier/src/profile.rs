//! Sign-certificate profiles: how a participant identifier is encoded in a
//! signing certificate's subject.

use serde::{Deserialize, Serialize};

use crate::cert::{
    Certificate, OID_COMMON_NAME, OID_COUNTRY, OID_ORGANIZATION, OID_SERIAL_NUMBER,
};
use crate::error::{VerificationError, VerificationResult};
use crate::identifier::ClientId;

/// Derives the participant identifier from a certificate subject.
pub trait SignCertificateProfile {
    /// `signer` is the claimed signer; profiles that do not carry the full
    /// identifier in the subject take the missing parts from it.
    fn subject_identifier(&self, signer: &ClientId, cert: &Certificate)
        -> VerificationResult<ClientId>;
}

/// Built-in profiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignCertProfileKind {
    /// `C` = instance, `O` = member class, `CN` = member code.
    #[default]
    DnFields,
    /// `serialNumber` = `INSTANCE/CLASS/CODE`, or just the member code with
    /// instance and class taken from the claimed signer. Without a
    /// `serialNumber`, `CN` is the member code.
    SerialNumber,
}

impl SignCertificateProfile for SignCertProfileKind {
    fn subject_identifier(
        &self,
        signer: &ClientId,
        cert: &Certificate,
    ) -> VerificationResult<ClientId> {
        match self {
            Self::DnFields => Ok(ClientId::member(
                required(cert, OID_COUNTRY, "C")?,
                required(cert, OID_ORGANIZATION, "O")?,
                required(cert, OID_COMMON_NAME, "CN")?,
            )),
            Self::SerialNumber => {
                let Some(serial) = cert.subject_attribute(OID_SERIAL_NUMBER) else {
                    return Ok(ClientId::member(
                        &signer.instance,
                        &signer.member_class,
                        required(cert, OID_COMMON_NAME, "CN")?,
                    ));
                };
                match serial.split('/').collect::<Vec<_>>().as_slice() {
                    [instance, class, code] => Ok(ClientId::member(*instance, *class, *code)),
                    [code] => Ok(ClientId::member(
                        &signer.instance,
                        &signer.member_class,
                        *code,
                    )),
                    _ => Err(VerificationError::incorrect_certificate(format!(
                        "Certificate serialNumber '{}' is not a member identifier",
                        serial
                    ))),
                }
            }
        }
    }
}

fn required<'c>(cert: &'c Certificate, oid: &str, label: &str) -> VerificationResult<&'c str> {
    cert.subject_attribute(oid).ok_or_else(|| {
        VerificationError::incorrect_certificate(format!(
            "Certificate subject {} has no {} attribute",
            cert.subject(),
            label
        ))
    })
}

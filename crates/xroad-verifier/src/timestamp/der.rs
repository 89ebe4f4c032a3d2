//! RFC 3161 `TimeStampToken` decoding (CMS `SignedData` over `TSTInfo`).

use chrono::{DateTime, Utc};
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier};
use der::asn1::OctetString;
use der::{Decode, Encode};
use x509_tsp::TstInfo;

use super::{SignerId, TimestampDecodeError, TimestampToken};
use crate::cert::Certificate;
use crate::crypto::SignatureAlgorithm;
use crate::digest::DigestAlgorithm;

/// `id-signedData`
const OID_SIGNED_DATA: &str = "1.2.840.113549.1.7.2";
/// `id-ct-TSTInfo`
const OID_TST_INFO: &str = "1.2.840.113549.1.9.16.1.4";
/// `id-messageDigest`
const OID_MESSAGE_DIGEST: &str = "1.2.840.113549.1.9.4";

pub(super) fn decode(der: &[u8]) -> Result<TimestampToken, TimestampDecodeError> {
    let ci = ContentInfo::from_der(der).map_err(err("ContentInfo"))?;
    if ci.content_type.to_string() != OID_SIGNED_DATA {
        return Err(TimestampDecodeError(format!(
            "content type {} is not signedData",
            ci.content_type
        )));
    }
    let signed = SignedData::from_der(&ci.content.to_der().map_err(err("SignedData"))?)
        .map_err(err("SignedData"))?;

    // 1. TSTInfo
    let encap = &signed.encap_content_info;
    if encap.econtent_type.to_string() != OID_TST_INFO {
        return Err(TimestampDecodeError(format!(
            "encapsulated content type {} is not TSTInfo",
            encap.econtent_type
        )));
    }
    let econtent = encap
        .econtent
        .as_ref()
        .ok_or_else(|| TimestampDecodeError("token has no encapsulated TSTInfo".to_string()))?;
    let octets = OctetString::from_der(&econtent.to_der().map_err(err("eContent"))?)
        .map_err(err("eContent"))?;
    let tst_info_der = octets.as_bytes().to_vec();
    let tst_info = TstInfo::from_der(&tst_info_der).map_err(err("TSTInfo"))?;

    let imprint_oid = &tst_info.message_imprint.hash_algorithm.oid;
    let hash_algorithm = DigestAlgorithm::from_oid(imprint_oid).ok_or_else(|| {
        TimestampDecodeError(format!("unsupported message imprint hash {}", imprint_oid))
    })?;
    let gen_time = unix(tst_info.gen_time.to_unix_duration().as_secs())?;

    // 2. Signer
    let signer_info = signed
        .signer_infos
        .0
        .iter()
        .next()
        .ok_or_else(|| TimestampDecodeError("token has no signer info".to_string()))?;

    let signer = match &signer_info.sid {
        SignerIdentifier::IssuerAndSerialNumber(isn) => SignerId::IssuerSerial {
            issuer: isn.issuer.to_der().map_err(err("Name"))?,
            serial: isn.serial_number.as_bytes().to_vec(),
        },
        SignerIdentifier::SubjectKeyIdentifier(ski) => {
            SignerId::SubjectKeyId(ski.0.as_bytes().to_vec())
        }
    };

    let digest_oid = &signer_info.digest_alg.oid;
    let digest_algorithm = DigestAlgorithm::from_oid(digest_oid)
        .ok_or_else(|| TimestampDecodeError(format!("unsupported digest {}", digest_oid)))?;
    let sig_oid = signer_info.signature_algorithm.oid.to_string();
    let signature_algorithm = SignatureAlgorithm::from_oid(&sig_oid, Some(digest_algorithm))
        .ok_or_else(|| {
            TimestampDecodeError(format!("unsupported signature algorithm {}", sig_oid))
        })?;

    // 3. Signed content: the attribute SET when present, else TSTInfo itself
    let (signed_content, message_digest) = match &signer_info.signed_attrs {
        Some(attrs) => {
            let mut message_digest = None;
            for attr in attrs.iter() {
                if attr.oid.to_string() == OID_MESSAGE_DIGEST {
                    if let Some(value) = attr.values.iter().next() {
                        let digest = OctetString::from_der(
                            &value.to_der().map_err(err("messageDigest"))?,
                        )
                        .map_err(err("messageDigest"))?;
                        message_digest = Some(digest.as_bytes().to_vec());
                    }
                }
            }
            let message_digest = message_digest.ok_or_else(|| {
                TimestampDecodeError("signed attributes carry no messageDigest".to_string())
            })?;
            (attrs.to_der().map_err(err("SignedAttributes"))?, Some(message_digest))
        }
        None => (tst_info_der.clone(), None),
    };

    let mut certs = Vec::new();
    for choice in signed.certificates.iter().flat_map(|set| set.0.iter()) {
        if let CertificateChoices::Certificate(cert) = choice {
            let der = cert.to_der().map_err(err("Certificate"))?;
            certs.push(
                Certificate::from_der(&der).map_err(|e| TimestampDecodeError(e.to_string()))?,
            );
        }
    }

    Ok(TimestampToken {
        hash_algorithm,
        message_imprint: tst_info.message_imprint.hashed_message.as_bytes().to_vec(),
        gen_time,
        signer,
        digest_algorithm,
        signed_content,
        message_digest,
        tst_info: tst_info_der,
        signature_algorithm,
        signature: signer_info.signature.as_bytes().to_vec(),
        certs,
    })
}

fn unix(secs: u64) -> Result<DateTime<Utc>, TimestampDecodeError> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .ok_or_else(|| TimestampDecodeError(format!("genTime out of range: {}", secs)))
}

fn err(what: &'static str) -> impl Fn(der::Error) -> TimestampDecodeError {
    move |e| TimestampDecodeError(format!("{}: {}", what, e))
}

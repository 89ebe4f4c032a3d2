//! RFC 6960 DER decoding into the OCSP domain model.

use chrono::{DateTime, Utc};
use der::asn1::GeneralizedTime;
use der::{Decode, Encode};
use x509_ocsp::{BasicOcspResponse, OcspResponseStatus, ResponderId as DerResponderId};

use super::{CertId, CertStatus, OcspDecodeError, OcspResponse, ResponderId, SingleResponse};
use crate::cert::Certificate;
use crate::crypto::SignatureAlgorithm;
use crate::digest::DigestAlgorithm;

/// `id-pkix-ocsp-basic`
const OCSP_BASIC: &str = "1.3.6.1.5.5.7.48.1.1";

pub(super) fn decode(der: &[u8]) -> Result<OcspResponse, OcspDecodeError> {
    let response = x509_ocsp::OcspResponse::from_der(der).map_err(err("OCSPResponse"))?;
    if response.response_status != OcspResponseStatus::Successful {
        return Err(OcspDecodeError(format!(
            "response status is {:?}",
            response.response_status
        )));
    }
    let bytes = response
        .response_bytes
        .ok_or_else(|| OcspDecodeError("response has no responseBytes".to_string()))?;
    if bytes.response_type.to_string() != OCSP_BASIC {
        return Err(OcspDecodeError(format!(
            "unsupported response type {}",
            bytes.response_type
        )));
    }

    let basic =
        BasicOcspResponse::from_der(bytes.response.as_bytes()).map_err(err("BasicOCSPResponse"))?;
    let tbs = &basic.tbs_response_data;

    let responder_id = match &tbs.responder_id {
        DerResponderId::ByName(name) => ResponderId::ByName(name.to_der().map_err(err("Name"))?),
        DerResponderId::ByKey(hash) => ResponderId::ByKey(hash.as_bytes().to_vec()),
    };

    let mut responses = Vec::with_capacity(tbs.responses.len());
    for single in &tbs.responses {
        let hash_algorithm = DigestAlgorithm::from_oid(&single.cert_id.hash_algorithm.oid)
            .ok_or_else(|| {
                OcspDecodeError(format!(
                    "unsupported CertID hash {}",
                    single.cert_id.hash_algorithm.oid
                ))
            })?;
        let status = match &single.cert_status {
            x509_ocsp::CertStatus::Good(_) => CertStatus::Good,
            x509_ocsp::CertStatus::Revoked(info) => CertStatus::Revoked {
                revocation_time: time(&info.revocation_time)?,
                reason: info.revocation_reason.as_ref().map(|r| format!("{:?}", r)),
            },
            x509_ocsp::CertStatus::Unknown(_) => CertStatus::Unknown,
        };
        let next_update = match &single.next_update {
            Some(t) => Some(time(t)?),
            None => None,
        };
        responses.push(SingleResponse {
            cert_id: CertId {
                hash_algorithm,
                issuer_name_hash: single.cert_id.issuer_name_hash.as_bytes().to_vec(),
                issuer_key_hash: single.cert_id.issuer_key_hash.as_bytes().to_vec(),
                serial: single.cert_id.serial_number.as_bytes().to_vec(),
            },
            status,
            this_update: time(&single.this_update)?,
            next_update,
        });
    }

    let oid = basic.signature_algorithm.oid.to_string();
    let signature_algorithm = SignatureAlgorithm::from_oid(&oid, None)
        .ok_or_else(|| OcspDecodeError(format!("unsupported signature algorithm {}", oid)))?;

    let mut certs = Vec::new();
    for cert in basic.certs.iter().flatten() {
        let der = cert.to_der().map_err(err("Certificate"))?;
        certs.push(Certificate::from_der(&der).map_err(|e| OcspDecodeError(e.to_string()))?);
    }

    Ok(OcspResponse {
        responder_id,
        produced_at: time(&tbs.produced_at)?,
        responses,
        tbs_response_data: tbs.to_der().map_err(err("ResponseData"))?,
        signature_algorithm,
        signature: basic.signature.raw_bytes().to_vec(),
        certs,
    })
}

/// Any OCSP time type re-read through its DER form.
fn time<T: Encode>(value: &T) -> Result<DateTime<Utc>, OcspDecodeError> {
    let der = value.to_der().map_err(err("GeneralizedTime"))?;
    let generalized = GeneralizedTime::from_der(&der).map_err(err("GeneralizedTime"))?;
    let secs = generalized.to_unix_duration().as_secs();
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .ok_or_else(|| OcspDecodeError(format!("time out of range: {}", secs)))
}

fn err(what: &'static str) -> impl Fn(der::Error) -> OcspDecodeError {
    move |e| OcspDecodeError(format!("{}: {}", what, e))
}

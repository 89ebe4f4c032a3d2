//! Test PKI: rcgen-minted Ed25519 certificates plus dalek signing keys.

use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::SigningKey;
use rcgen::{
    date_time_ymd, BasicConstraints, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, PKCS_ED25519,
};

use crate::cert::Certificate;

pub(crate) struct Issued {
    pub cert: Certificate,
    pub rcgen: rcgen::Certificate,
    pub key: KeyPair,
}

impl Issued {
    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_pkcs8_der(&self.key.serialize_der()).unwrap()
    }
}

pub(crate) fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2014, 9, 30, 12, 0, 0).unwrap()
}

pub(crate) fn params(cn: &str) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, cn);
    params.not_before = date_time_ymd(2014, 1, 1);
    params.not_after = date_time_ymd(2034, 1, 1);
    params
}

fn ca_params(cn: &str) -> CertificateParams {
    let mut params = params(cn);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign];
    params
}

fn finish(rcgen: rcgen::Certificate, key: KeyPair) -> Issued {
    Issued {
        cert: Certificate::from_der(rcgen.der()).unwrap(),
        rcgen,
        key,
    }
}

pub(crate) fn root_ca(cn: &str) -> Issued {
    let key = KeyPair::generate_for(&PKCS_ED25519).unwrap();
    let cert = ca_params(cn).self_signed(&key).unwrap();
    finish(cert, key)
}

pub(crate) fn issue(params: CertificateParams, issuer: &Issued) -> Issued {
    let key = KeyPair::generate_for(&PKCS_ED25519).unwrap();
    let cert = params.signed_by(&key, &issuer.rcgen, &issuer.key).unwrap();
    finish(cert, key)
}

pub(crate) fn intermediate_ca(cn: &str, issuer: &Issued) -> Issued {
    issue(ca_params(cn), issuer)
}

pub(crate) fn ocsp_responder(cn: &str, issuer: &Issued) -> Issued {
    let mut params = params(cn);
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::OcspSigning];
    issue(params, issuer)
}

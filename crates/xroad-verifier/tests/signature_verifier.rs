mod common;

use common::*;

use xroad_verifier::message_part::{attachment, MESSAGE, SIG_HASH_CHAIN_RESULT};
use xroad_verifier::profile::SignCertProfileKind;
use xroad_verifier::{
    CertChainError, ClientId, ErrorKind, MapResolver, MessagePart, OcspCertChainVerifier,
    Signature, SignatureVerifier, StaticTrustConfiguration, VerificationResult,
};

fn conf(ca: &Issued) -> StaticTrustConfiguration {
    StaticTrustConfiguration::new()
        .with_instance("EE", SignCertProfileKind::DnFields)
        .with_ca_cert("EE", ca.cert.clone())
}

fn consumer() -> ClientId {
    ClientId::member("EE", "BUSINESS", "consumer")
}

/// Verify `xml` over `message` with the default fixture collaborators.
fn verify_message(
    ca: &Issued,
    xml: &str,
    message: &[u8],
    signer: &ClientId,
) -> VerificationResult<()> {
    let conf = conf(ca);
    let chain = FakeChainVerifier::default();
    let mut verifier = SignatureVerifier::new(&conf, &chain, Signature::parse(xml)?);
    verifier.add_part(MessagePart::with_data(MESSAGE, ALG, message.to_vec()));
    verifier.verify(signer, at())
}

/// Replace the text of the first `ds:DigestValue` following `marker`.
fn replace_digest_after(xml: &str, marker: &str, value: &str) -> String {
    let start = xml.find(marker).unwrap() + marker.len();
    let open = start + xml[start..].find("<ds:DigestValue>").unwrap() + "<ds:DigestValue>".len();
    let close = open + xml[open..].find('<').unwrap();
    format!("{}{}{}", &xml[..open], value, &xml[close..])
}

#[test]
fn test_signed_message_verifies_for_signer() {
    let ca = ca("Test CA");
    let signer = member_signer("consumer", &ca);
    let xml = SignatureBuilder::new(&signer).reference(MESSAGE, MESSAGE_0).build();

    let conf = conf(&ca);
    let chain = FakeChainVerifier::default();
    let mut verifier = SignatureVerifier::new(&conf, &chain, Signature::parse(&xml).unwrap());
    verifier.add_part(MessagePart::with_data(MESSAGE, ALG, MESSAGE_0.to_vec()));
    verifier.verify(&consumer(), at()).unwrap();

    let calls = chain.calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].instance, "EE");
    assert_eq!(calls[0].leaf, signer.cert);
    assert!(calls[0].extra_certs.is_empty());
    assert_eq!(calls[0].ocsp_responses, vec![b"ocsp response".to_vec()]);
    assert_eq!(calls[0].at, at());
}

#[test]
fn test_fixture_certificates_carry_key_usage() {
    let ca = ca("Test CA");
    let signer = member_signer("consumer", &ca);
    let auth = auth_cert("consumer", &ca);
    assert!(signer.cert.is_signing_cert());
    assert!(!signer.cert.is_ca());
    assert!(!auth.cert.is_signing_cert());
    assert!(ca.cert.is_ca());
}

#[test]
fn test_wrong_signer_is_incorrect_certificate() {
    let ca = ca("Test CA");
    let signer = member_signer("consumer", &ca);
    let xml = SignatureBuilder::new(&signer).reference(MESSAGE, MESSAGE_0).build();

    let conf = conf(&ca);
    let chain = FakeChainVerifier::default();
    let mut verifier = SignatureVerifier::new(&conf, &chain, Signature::parse(&xml).unwrap());
    verifier.add_part(MessagePart::with_data(MESSAGE, ALG, MESSAGE_0.to_vec()));
    let err = verifier
        .verify(&ClientId::member("EE", "BUSINESS", "FOORBAR"), at())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncorrectCertificate);
    assert!(err.detail().contains("FOORBAR"));
    assert!(chain.calls.borrow().is_empty());
}

#[test]
fn test_subsystem_of_signer_is_accepted() {
    let ca = ca("Test CA");
    let signer = member_signer("consumer", &ca);
    let xml = SignatureBuilder::new(&signer).reference(MESSAGE, MESSAGE_0).build();
    let subsystem = ClientId::subsystem("EE", "BUSINESS", "consumer", "subsystem");
    verify_message(&ca, &xml, MESSAGE_0, &subsystem).unwrap();
}

#[test]
fn test_changed_message_is_invalid_signature_value() {
    let ca = ca("Test CA");
    let signer = member_signer("consumer", &ca);
    let xml = SignatureBuilder::new(&signer).reference(MESSAGE, MESSAGE_0).build();
    let err = verify_message(&ca, &xml, b"foo", &consumer()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSignatureValue);
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn test_other_key_is_invalid_signature_value() {
    let ca = ca("Test CA");
    let signer = member_signer("consumer", &ca);
    let impostor = member_signer("consumer", &ca);
    let xml = SignatureBuilder::new(&signer).reference(MESSAGE, MESSAGE_0).build();

    // Same name, different key in KeyInfo.
    let forged = xml.replace(&b64(signer.cert.der()), &b64(impostor.cert.der()));
    let err = verify_message(&ca, &forged, MESSAGE_0, &consumer()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSignatureValue);
    assert_eq!(err.detail(), "Signature is not valid");
}

#[test]
fn test_verification_is_repeatable() {
    let ca = ca("Test CA");
    let signer = member_signer("consumer", &ca);
    let xml = SignatureBuilder::new(&signer).reference(MESSAGE, MESSAGE_0).build();

    let conf = conf(&ca);
    let chain = FakeChainVerifier::default();
    let mut verifier = SignatureVerifier::new(&conf, &chain, Signature::parse(&xml).unwrap());
    verifier.add_part(MessagePart::with_data(MESSAGE, ALG, MESSAGE_0.to_vec()));
    for _ in 0..3 {
        verifier.verify(&consumer(), at()).unwrap();
        let err = verifier
            .verify(&ClientId::member("EE", "BUSINESS", "FOORBAR"), at())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncorrectCertificate);
    }
}

#[test]
fn test_missing_signing_certificate() {
    let ca = ca("Test CA");
    let signer = member_signer("consumer", &ca);
    let xml = SignatureBuilder::new(&signer)
        .reference(MESSAGE, MESSAGE_0)
        .without_key_info()
        .build();
    let err = verify_message(&ca, &xml, MESSAGE_0, &consumer()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSignature);
    assert_eq!(err.detail(), "Signature does not contain signing certificate");
}

#[test]
fn test_certificate_without_non_repudiation_is_rejected() {
    let ca = ca("Test CA");
    let signer = auth_cert("consumer", &ca);
    let xml = SignatureBuilder::new(&signer).reference(MESSAGE, MESSAGE_0).build();
    let err = verify_message(&ca, &xml, MESSAGE_0, &consumer()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSignature);
    assert!(err.detail().ends_with("is not a signing certificate"));
}

#[test]
fn test_missing_ocsp_responses() {
    let ca = ca("Test CA");
    let signer = member_signer("consumer", &ca);
    let xml = SignatureBuilder::new(&signer)
        .reference(MESSAGE, MESSAGE_0)
        .ocsp_responses(Vec::new())
        .build();
    let err = verify_message(&ca, &xml, MESSAGE_0, &consumer()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSignature);
    assert_eq!(err.detail(), "Could not get any OCSP elements from signature");
}

#[test]
fn test_caller_resolver_serves_message() {
    let ca = ca("Test CA");
    let signer = member_signer("consumer", &ca);
    let xml = SignatureBuilder::new(&signer).reference(MESSAGE, MESSAGE_0).build();

    let conf = conf(&ca);
    let chain = FakeChainVerifier::default();
    let mut verifier = SignatureVerifier::new(&conf, &chain, Signature::parse(&xml).unwrap());
    verifier.set_signature_resource_resolver(
        MapResolver::new().with_entry(MESSAGE, MESSAGE_0.to_vec()),
    );
    verifier.verify(&consumer(), at()).unwrap();
}

#[test]
fn test_raw_message_is_what_the_signature_covers() {
    let ca = ca("Test CA");
    let signer = member_signer("consumer", &ca);
    let xml = SignatureBuilder::new(&signer).reference(MESSAGE, MESSAGE_0).build();

    let conf = conf(&ca);
    let chain = FakeChainVerifier::default();
    let mut verifier = SignatureVerifier::new(&conf, &chain, Signature::parse(&xml).unwrap());
    verifier.add_part(
        MessagePart::with_data(MESSAGE, ALG, b"<body/>".to_vec()).with_raw_message(MESSAGE_0),
    );
    verifier.verify(&consumer(), at()).unwrap();
}

mod schema {
    use super::*;

    fn with_stray_property(xml: &str) -> String {
        xml.replace(
            "<xades:UnsignedSignatureProperties>",
            "<xades:UnsignedSignatureProperties><xades:Bogus/>",
        )
    }

    #[test]
    fn test_schema_violation_is_malformed() {
        let ca = ca("Test CA");
        let signer = member_signer("consumer", &ca);
        let xml = with_stray_property(
            &SignatureBuilder::new(&signer).reference(MESSAGE, MESSAGE_0).build(),
        );
        let err = verify_message(&ca, &xml, MESSAGE_0, &consumer()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSignature);
        assert!(err.detail().contains("xades:Bogus"));
    }

    #[test]
    fn test_disabling_schema_only_suppresses_schema_failures() {
        let ca = ca("Test CA");
        let signer = member_signer("consumer", &ca);
        let xml = with_stray_property(
            &SignatureBuilder::new(&signer).reference(MESSAGE, MESSAGE_0).build(),
        );
        let conf = conf(&ca);
        let chain = FakeChainVerifier::default();

        let mut verifier = SignatureVerifier::new(&conf, &chain, Signature::parse(&xml).unwrap());
        verifier.set_verify_schema(false);
        verifier.add_part(MessagePart::with_data(MESSAGE, ALG, MESSAGE_0.to_vec()));
        verifier.verify(&consumer(), at()).unwrap();

        let mut verifier = SignatureVerifier::new(&conf, &chain, Signature::parse(&xml).unwrap());
        verifier.set_verify_schema(false);
        verifier.add_part(MessagePart::with_data(MESSAGE, ALG, b"foo".to_vec()));
        let err = verifier.verify(&consumer(), at()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSignatureValue);
    }
}

mod batch {
    use super::*;

    const ATTACHMENT: &[u8] = b"attachment body";

    fn batch_signature(signer: &Issued) -> (String, String, String) {
        let (chain, result) = hash_chain(&[(MESSAGE, MESSAGE_0), (attachment(1).as_str(), ATTACHMENT)]);
        let xml = SignatureBuilder::new(signer)
            .reference(SIG_HASH_CHAIN_RESULT, result.as_bytes())
            .build();
        (xml, chain, result)
    }

    #[test]
    fn test_batch_signature_with_all_parts() {
        let ca = ca("Test CA");
        let signer = member_signer("consumer", &ca);
        let (xml, chain, result) = batch_signature(&signer);
        let conf = conf(&ca);
        let chain_verifier = FakeChainVerifier::default();

        let mut verifier =
            SignatureVerifier::new(&conf, &chain_verifier, Signature::parse(&xml).unwrap())
                .with_hash_chain_result(result)
                .with_hash_chain(chain);
        verifier.add_parts([
            MessagePart::with_data(MESSAGE, ALG, MESSAGE_0.to_vec()),
            MessagePart::with_digest(attachment(1), ALG, ALG.digest(ATTACHMENT)),
        ]);
        verifier.verify(&consumer(), at()).unwrap();
        assert_eq!(chain_verifier.calls.borrow().len(), 1);
    }

    #[test]
    fn test_omitted_part_fails() {
        let ca = ca("Test CA");
        let signer = member_signer("consumer", &ca);
        let (xml, chain, result) = batch_signature(&signer);
        let conf = conf(&ca);
        let chain_verifier = FakeChainVerifier::default();

        let mut verifier =
            SignatureVerifier::new(&conf, &chain_verifier, Signature::parse(&xml).unwrap())
                .with_hash_chain_result(result)
                .with_hash_chain(chain);
        verifier.add_part(MessagePart::with_data(MESSAGE, ALG, MESSAGE_0.to_vec()));
        let err = verifier.verify(&consumer(), at()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSignature);
        assert_eq!(
            err.detail(),
            "hash chain verification failed: Cannot resolve URI: /attachment1"
        );
        assert!(chain_verifier.calls.borrow().is_empty());
    }

    #[test]
    fn test_mutated_part_fails() {
        let ca = ca("Test CA");
        let signer = member_signer("consumer", &ca);
        let (xml, chain, result) = batch_signature(&signer);
        let conf = conf(&ca);
        let chain_verifier = FakeChainVerifier::default();

        let mut verifier =
            SignatureVerifier::new(&conf, &chain_verifier, Signature::parse(&xml).unwrap())
                .with_hash_chain_result(result)
                .with_hash_chain(chain);
        verifier.add_parts([
            MessagePart::with_data(MESSAGE, ALG, MESSAGE_0.to_vec()),
            MessagePart::with_data(attachment(1), ALG, b"attachment bodY".to_vec()),
        ]);
        let err = verifier.verify(&consumer(), at()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSignature);
        assert!(err.detail().contains("/attachment1"));
    }

    #[test]
    fn test_hash_chain_resolver_supplies_attachment() {
        let ca = ca("Test CA");
        let signer = member_signer("consumer", &ca);
        let (xml, chain, result) = batch_signature(&signer);
        let conf = conf(&ca);
        let chain_verifier = FakeChainVerifier::default();

        let mut verifier =
            SignatureVerifier::new(&conf, &chain_verifier, Signature::parse(&xml).unwrap())
                .with_hash_chain_result(result)
                .with_hash_chain(chain);
        verifier.add_part(MessagePart::with_data(MESSAGE, ALG, MESSAGE_0.to_vec()));
        verifier.set_hash_chain_resolver(
            MapResolver::new().with_entry(attachment(1), ATTACHMENT.to_vec()),
        );
        verifier.verify(&consumer(), at()).unwrap();
    }

    #[test]
    fn test_tampered_result_is_invalid_signature_value() {
        let ca = ca("Test CA");
        let signer = member_signer("consumer", &ca);
        let (xml, _, _) = batch_signature(&signer);
        // A self-consistent chain over other content is not what was signed.
        let (other_chain, other_result) = hash_chain(&[(MESSAGE, &b"<other/>"[..])]);
        let conf = conf(&ca);
        let chain_verifier = FakeChainVerifier::default();

        let mut verifier =
            SignatureVerifier::new(&conf, &chain_verifier, Signature::parse(&xml).unwrap())
                .with_hash_chain_result(other_result)
                .with_hash_chain(other_chain);
        verifier.add_part(MessagePart::with_data(MESSAGE, ALG, b"<other/>".to_vec()));
        let err = verifier.verify(&consumer(), at()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSignatureValue);
    }
}

mod evidence {
    use super::*;

    #[test]
    fn test_extra_certificates_reach_chain_verifier() {
        let ca = ca("Test CA");
        let signer = member_signer("consumer", &ca);
        let xml = SignatureBuilder::new(&signer)
            .reference(MESSAGE, MESSAGE_0)
            .extra_cert(ca.cert.clone())
            .build();

        let conf = conf(&ca);
        let chain = FakeChainVerifier::default();
        let mut verifier = SignatureVerifier::new(&conf, &chain, Signature::parse(&xml).unwrap());
        verifier.add_part(MessagePart::with_data(MESSAGE, ALG, MESSAGE_0.to_vec()));
        verifier.verify(&consumer(), at()).unwrap();
        assert_eq!(chain.calls.borrow()[0].extra_certs, vec![ca.cert.clone()]);
    }

    #[test]
    fn test_wrapped_signed_properties_are_rejected() {
        let ca = ca("Test CA");
        let signer = member_signer("consumer", &ca);
        let xml = SignatureBuilder::new(&signer)
            .reference(MESSAGE, MESSAGE_0)
            .build();
        verify_message(&ca, &xml, MESSAGE_0, &consumer()).unwrap();

        let wrapped = xml.replace(
            "</ds:Signature>",
            r#"<ds:Object><xades:SignedProperties Id="signed-properties"/></ds:Object></ds:Signature>"#,
        );
        let err = verify_message(&ca, &wrapped, MESSAGE_0, &consumer()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSignature);
        assert_eq!(err.detail(), "duplicate Id attribute value: signed-properties");
    }

    #[test]
    fn test_extra_certificate_reference_errors() {
        let ca = ca("Test CA");
        let signer = member_signer("consumer", &ca);
        let xml = SignatureBuilder::new(&signer)
            .reference(MESSAGE, MESSAGE_0)
            .extra_cert(ca.cert.clone())
            .build();

        let dangling = xml.replace(r##"URI="#cert-0""##, r##"URI="#cert-9""##);
        let err = verify_message(&ca, &dangling, MESSAGE_0, &consumer()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSignature);
        assert_eq!(err.detail(), "Could not find certificate with id #cert-9");

        let wrong_digest = replace_digest_after(&xml, r##"URI="#cert-0""##, "AAAA");
        let err = verify_message(&ca, &wrong_digest, MESSAGE_0, &consumer()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSignature);
        assert!(err.detail().ends_with("digest does not match"));
    }

    #[test]
    fn test_timestamp_manifests() {
        let ca = ca("Test CA");
        let signer = member_signer("consumer", &ca);
        let xml = SignatureBuilder::new(&signer)
            .reference(MESSAGE, MESSAGE_0)
            .timestamp_manifest()
            .build();
        verify_message(&ca, &xml, MESSAGE_0, &consumer()).unwrap();

        let mismatch = replace_digest_after(&xml, r##"URI="#signature-value""##, "AAAA");
        let err = verify_message(&ca, &mismatch, MESSAGE_0, &consumer()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidReference);
        assert_eq!(err.detail(), "Timestamp manifest verification failed for ts-manifest-0");

        let missing = xml.replace(r##"URI="#signature-value""##, r##"URI="#no-such-element""##);
        let err = verify_message(&ca, &missing, MESSAGE_0, &consumer()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidReference);
        assert_eq!(err.detail(), "Could not find #no-such-element");
    }

    #[test]
    fn test_chain_failure_is_passed_through() {
        let ca = ca("Test CA");
        let signer = member_signer("consumer", &ca);
        let xml = SignatureBuilder::new(&signer).reference(MESSAGE, MESSAGE_0).build();

        let conf = conf(&ca);
        let chain = FakeChainVerifier::failing(CertChainError::Revoked {
            subject: signer.cert.subject().to_string(),
            detail: "keyCompromise".to_string(),
        });
        let mut verifier = SignatureVerifier::new(&conf, &chain, Signature::parse(&xml).unwrap());
        verifier.add_part(MessagePart::with_data(MESSAGE, ALG, MESSAGE_0.to_vec()));
        let err = verifier.verify(&consumer(), at()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CertChainRevoked);
        assert_eq!(err.exit_code(), 5);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_default_chain_verifier_rejects_undecodable_ocsp() {
        let ca = ca("Test CA");
        let signer = member_signer("consumer", &ca);
        let xml = SignatureBuilder::new(&signer).reference(MESSAGE, MESSAGE_0).build();

        let conf = conf(&ca);
        let chain = OcspCertChainVerifier::new(&conf);
        let mut verifier = SignatureVerifier::new(&conf, &chain, Signature::parse(&xml).unwrap());
        verifier.add_part(MessagePart::with_data(MESSAGE, ALG, MESSAGE_0.to_vec()));
        let err = verifier.verify(&consumer(), at()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CertChainInvalidValidationInfo);
    }
}

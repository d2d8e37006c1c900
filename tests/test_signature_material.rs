//! Tests for certificate and key loading and capability derivation.

use pdf_signet::material::{derive, find_by_subject, PrivateKeyMaterial, SigningCredentials};
use pdf_signet::signatures::ExternalSignature;
use pdf_signet::{DigestAlgorithm, Error};
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn rsa_credentials() -> SigningCredentials {
    SigningCredentials::from_pem_files(fixture("rsa_cert.pem"), fixture("rsa_key.pem")).unwrap()
}

mod loading_tests {
    use super::*;

    #[test]
    fn test_load_from_files() {
        let creds = rsa_credentials();
        assert_eq!(creds.common_name().as_deref(), Some("Test Signer"));
        assert!(creds.subject().unwrap().contains("O=Signet Test"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = SigningCredentials::from_pem_files(fixture("missing.pem"), fixture("rsa_key.pem"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_key_in_certificate_slot() {
        let key = std::fs::read(fixture("rsa_key.pem")).unwrap();
        let result = SigningCredentials::from_pem(&key, &key);
        assert!(matches!(result, Err(Error::Certificate(_))));
    }

    #[test]
    fn test_garbage_certificate_der() {
        let result = SigningCredentials::from_der(vec![0x30, 0x03, 0x02, 0x01, 0x01], PrivateKeyMaterial::Pkcs1(vec![]));
        assert!(matches!(result, Err(Error::Certificate(_))));
    }

    #[test]
    fn test_find_by_subject() {
        let ec = SigningCredentials::from_pem_files(fixture("ec_cert.pem"), fixture("ec_key.pem")).unwrap();
        let all = vec![ec, rsa_credentials()];
        let found = find_by_subject(&all, "test signer").unwrap();
        assert_eq!(found.common_name().as_deref(), Some("Test Signer"));
    }
}

mod derive_tests {
    use super::*;

    #[test]
    fn test_rsa_uses_configured_digest() {
        for digest in [DigestAlgorithm::Sha256, DigestAlgorithm::Sha512] {
            let (capability, chain) = derive(Some(&rsa_credentials()), digest).unwrap();
            assert_eq!(capability.digest_algorithm(), digest);
            assert_eq!(chain.len(), 1);
        }
    }

    #[test]
    fn test_signature_length_matches_modulus() {
        let (capability, _) = derive(Some(&rsa_credentials()), DigestAlgorithm::Sha256).unwrap();
        let signature = capability.sign(b"payload").unwrap();
        assert_eq!(signature.len(), 256);
    }

    #[test]
    fn test_no_certificate() {
        assert!(matches!(
            derive(None, DigestAlgorithm::Sha256),
            Err(Error::NullCertificate)
        ));
    }

    #[test]
    fn test_ec_key_is_unsupported() {
        let ec = SigningCredentials::from_pem_files(fixture("ec_cert.pem"), fixture("ec_key.pem")).unwrap();
        assert!(matches!(
            derive(Some(&ec), DigestAlgorithm::Sha256),
            Err(Error::UnsupportedKey(_))
        ));
    }

    #[test]
    fn test_sec1_key_is_unsupported() {
        let creds = SigningCredentials::from_der(
            rsa_credentials().certificate_der().to_vec(),
            PrivateKeyMaterial::Sec1(vec![0x30, 0x00]),
        )
        .unwrap();
        assert!(matches!(
            derive(Some(&creds), DigestAlgorithm::Sha256),
            Err(Error::UnsupportedKey(_))
        ));
    }
}

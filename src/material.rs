//! Signing material: certificate, private key and the capability derived
//! from them.
//!
//! Only RSA keys can sign. A key is accepted as PKCS#8 or PKCS#1; its
//! components are carried over field by field into an [`RsaPrivateKey`],
//! which is validated and checked against the certificate's public key.

use crate::error::{Error, Result};
use crate::signatures::{DigestAlgorithm, ExternalSignature, SignatureChain};
use der::asn1::ObjectIdentifier;
use pkcs1::der::Decode;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, Pkcs1v15Sign, RsaPrivateKey};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use std::fmt;
use std::path::Path;
use x509_parser::pem::parse_x509_pem;
use x509_parser::certificate::X509Certificate;
use x509_parser::parse_x509_certificate;
use x509_parser::public_key::PublicKey;

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

/// Encoded private key, tagged with its container format.
#[derive(Clone, PartialEq, Eq)]
pub enum PrivateKeyMaterial {
    /// `PrivateKeyInfo` (PEM label `PRIVATE KEY`)
    Pkcs8(Vec<u8>),
    /// `RSAPrivateKey` (PEM label `RSA PRIVATE KEY`)
    Pkcs1(Vec<u8>),
    /// `ECPrivateKey` (PEM label `EC PRIVATE KEY`)
    Sec1(Vec<u8>),
}

impl PrivateKeyMaterial {
    /// Container format name.
    pub fn format(&self) -> &'static str {
        match self {
            PrivateKeyMaterial::Pkcs8(_) => "PKCS#8",
            PrivateKeyMaterial::Pkcs1(_) => "PKCS#1",
            PrivateKeyMaterial::Sec1(_) => "SEC1",
        }
    }
}

impl fmt::Debug for PrivateKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}([REDACTED])", self.format())
    }
}

/// A signer certificate with its private key.
#[derive(Clone)]
pub struct SigningCredentials {
    certificate_der: Vec<u8>,
    private_key: PrivateKeyMaterial,
}

impl fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("subject", &self.subject())
            .field("private_key", &self.private_key)
            .finish()
    }
}

impl SigningCredentials {
    /// Credentials from a DER certificate and an encoded key.
    ///
    /// # Errors
    ///
    /// `Error::Certificate` when the certificate does not parse.
    pub fn from_der(certificate_der: Vec<u8>, private_key: PrivateKeyMaterial) -> Result<Self> {
        parse_x509_certificate(&certificate_der)
            .map_err(|e| Error::Certificate(format!("certificate: {}", e)))?;
        Ok(Self {
            certificate_der,
            private_key,
        })
    }

    /// Credentials from PEM text: a `CERTIFICATE` block and one of the
    /// `PRIVATE KEY`, `RSA PRIVATE KEY` or `EC PRIVATE KEY` blocks.
    pub fn from_pem(certificate_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let (_, cert) = parse_x509_pem(certificate_pem)
            .map_err(|e| Error::Certificate(format!("certificate PEM: {}", e)))?;
        if cert.label != "CERTIFICATE" {
            return Err(Error::Certificate(format!("expected CERTIFICATE, found {}", cert.label)));
        }

        let (_, key) =
            parse_x509_pem(key_pem).map_err(|e| Error::Certificate(format!("key PEM: {}", e)))?;
        let private_key = match key.label.as_str() {
            "PRIVATE KEY" => PrivateKeyMaterial::Pkcs8(key.contents),
            "RSA PRIVATE KEY" => PrivateKeyMaterial::Pkcs1(key.contents),
            "EC PRIVATE KEY" => PrivateKeyMaterial::Sec1(key.contents),
            "ENCRYPTED PRIVATE KEY" => {
                return Err(Error::UnsupportedKey("encrypted private keys".to_string()))
            },
            other => return Err(Error::Certificate(format!("unexpected key PEM label {}", other))),
        };

        Self::from_der(cert.contents, private_key)
    }

    /// Credentials from a certificate PEM file and a key PEM file.
    pub fn from_pem_files(certificate_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        let certificate = std::fs::read(certificate_path.as_ref())?;
        let key = std::fs::read(key_path.as_ref())?;
        Self::from_pem(&certificate, &key)
    }

    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    pub fn private_key(&self) -> &PrivateKeyMaterial {
        &self.private_key
    }

    fn certificate(&self) -> Result<X509Certificate<'_>> {
        let (_, cert) = parse_x509_certificate(&self.certificate_der)
            .map_err(|e| Error::Certificate(format!("certificate: {}", e)))?;
        Ok(cert)
    }

    /// Subject distinguished name, RFC 4514 style.
    pub fn subject(&self) -> Option<String> {
        self.certificate().ok().map(|cert| cert.subject().to_string())
    }

    /// First CN of the subject.
    pub fn common_name(&self) -> Option<String> {
        crate::signatures::cms::certificate_common_name(&self.certificate_der)
    }

    /// Case-insensitive substring match against the subject.
    pub fn subject_matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.subject()
            .is_some_and(|subject| subject.to_lowercase().contains(&needle))
    }
}

/// First credentials whose subject contains `needle`.
pub fn find_by_subject<'a>(candidates: &'a [SigningCredentials], needle: &str) -> Option<&'a SigningCredentials> {
    candidates.iter().find(|c| c.subject_matches(needle))
}

/// Raw RSA private key fields, big-endian without sign padding.
#[derive(Clone, PartialEq, Eq)]
pub struct RsaKeyComponents {
    pub modulus: Vec<u8>,
    pub public_exponent: Vec<u8>,
    pub private_exponent: Vec<u8>,
    pub prime1: Vec<u8>,
    pub prime2: Vec<u8>,
    pub exponent1: Vec<u8>,
    pub exponent2: Vec<u8>,
    pub coefficient: Vec<u8>,
}

impl fmt::Debug for RsaKeyComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKeyComponents")
            .field("modulus_bits", &(self.modulus.len() * 8))
            .finish_non_exhaustive()
    }
}

impl RsaKeyComponents {
    /// Read the components of a PKCS#1 `RSAPrivateKey`.
    pub fn from_pkcs1_der(der: &[u8]) -> Result<Self> {
        let key = pkcs1::RsaPrivateKey::from_der(der)
            .map_err(|e| Error::Certificate(format!("RSA private key: {}", e)))?;
        if key.other_prime_infos.is_some() {
            return Err(Error::UnsupportedKey("multi-prime RSA keys".to_string()));
        }
        Ok(Self {
            modulus: key.modulus.as_bytes().to_vec(),
            public_exponent: key.public_exponent.as_bytes().to_vec(),
            private_exponent: key.private_exponent.as_bytes().to_vec(),
            prime1: key.prime1.as_bytes().to_vec(),
            prime2: key.prime2.as_bytes().to_vec(),
            exponent1: key.exponent1.as_bytes().to_vec(),
            exponent2: key.exponent2.as_bytes().to_vec(),
            coefficient: key.coefficient.as_bytes().to_vec(),
        })
    }

    fn fields(&self) -> [(&'static str, &[u8]); 8] {
        [
            ("modulus", self.modulus.as_slice()),
            ("public exponent", self.public_exponent.as_slice()),
            ("private exponent", self.private_exponent.as_slice()),
            ("prime 1", self.prime1.as_slice()),
            ("prime 2", self.prime2.as_slice()),
            ("exponent 1", self.exponent1.as_slice()),
            ("exponent 2", self.exponent2.as_slice()),
            ("coefficient", self.coefficient.as_slice()),
        ]
    }

    /// Build and validate the key.
    ///
    /// # Errors
    ///
    /// `Error::InvalidKey` when a component is empty, the key fails
    /// validation, or a CRT value disagrees with the primes.
    pub fn to_private_key(&self) -> Result<RsaPrivateKey> {
        if let Some((name, _)) = self.fields().into_iter().find(|(_, value)| value.is_empty()) {
            return Err(Error::InvalidKey(format!("{} is missing", name)));
        }
        let uint = BigUint::from_bytes_be;
        let mut key = RsaPrivateKey::from_components(
            uint(&self.modulus),
            uint(&self.public_exponent),
            uint(&self.private_exponent),
            vec![uint(&self.prime1), uint(&self.prime2)],
        )
        .map_err(|e| Error::InvalidKey(e.to_string()))?;
        key.validate().map_err(|e| Error::InvalidKey(e.to_string()))?;
        key.precompute().map_err(|e| Error::InvalidKey(e.to_string()))?;

        if key.dp() != Some(&uint(&self.exponent1)) || key.dq() != Some(&uint(&self.exponent2)) {
            return Err(Error::InvalidKey("CRT exponents do not match the primes".to_string()));
        }
        // qinv is kept reduced into [0, p), so the magnitudes compare directly.
        let qinv = key.qinv().map(|qinv| qinv.to_bytes_be().1);
        if qinv != Some(uint(&self.coefficient).to_bytes_be()) {
            return Err(Error::InvalidKey("CRT coefficient does not match the primes".to_string()));
        }
        Ok(key)
    }
}

/// RSA private key bound to a digest algorithm; signs one message.
pub struct SigningCapability {
    key: RsaPrivateKey,
    digest: DigestAlgorithm,
}

impl fmt::Debug for SigningCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCapability")
            .field("digest", &self.digest)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl SigningCapability {
    pub fn new(key: RsaPrivateKey, digest: DigestAlgorithm) -> Self {
        Self { key, digest }
    }
}

impl ExternalSignature for SigningCapability {
    fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest
    }

    fn encryption_algorithm(&self) -> &'static str {
        "RSA"
    }

    fn sign(self, message: &[u8]) -> Result<Vec<u8>> {
        let hashed = self.digest.digest(message);
        let scheme = match self.digest {
            DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
            DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
            DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
            DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
        };
        self.key
            .sign(scheme, &hashed)
            .map_err(|e| Error::Signing(format!("RSA signature: {}", e)))
    }
}

/// Derive the signing capability and the chain to embed.
///
/// # Errors
///
/// - `Error::NullCertificate` when no credentials are given
/// - `Error::UnsupportedKey` for any key that is not RSA
/// - `Error::InvalidKey` for inconsistent RSA material or a key that does
///   not belong to the certificate
pub fn derive(
    credentials: Option<&SigningCredentials>,
    digest: DigestAlgorithm,
) -> Result<(SigningCapability, SignatureChain)> {
    let credentials = credentials.ok_or(Error::NullCertificate)?;

    let pkcs1_der = match &credentials.private_key {
        PrivateKeyMaterial::Sec1(_) => return Err(Error::UnsupportedKey("EC".to_string())),
        PrivateKeyMaterial::Pkcs1(der) => der.as_slice(),
        PrivateKeyMaterial::Pkcs8(der) => {
            let info = pkcs8::PrivateKeyInfo::try_from(der.as_slice())
                .map_err(|e| Error::Certificate(format!("PKCS#8 key: {}", e)))?;
            let oid = info.algorithm.oid;
            if oid != RSA_ENCRYPTION {
                return Err(Error::UnsupportedKey(key_algorithm_name(oid)));
            }
            info.private_key
        },
    };

    let key = RsaKeyComponents::from_pkcs1_der(pkcs1_der)?.to_private_key()?;
    check_certificate_key(credentials, &key)?;
    log::debug!(
        "Derived RSA signing capability: {} bit key, {}",
        key_bits(&key),
        digest.name()
    );

    Ok((
        SigningCapability::new(key, digest),
        SignatureChain::single(credentials.certificate_der.clone()),
    ))
}

fn key_algorithm_name(oid: ObjectIdentifier) -> String {
    if oid == EC_PUBLIC_KEY {
        "EC".to_string()
    } else if oid == ED25519 {
        "Ed25519".to_string()
    } else {
        oid.to_string()
    }
}

fn key_bits(key: &RsaPrivateKey) -> usize {
    key.n().bits()
}

fn check_certificate_key(credentials: &SigningCredentials, key: &RsaPrivateKey) -> Result<()> {
    let cert = credentials.certificate()?;
    let public = cert
        .public_key()
        .parsed()
        .map_err(|e| Error::Certificate(format!("certificate public key: {}", e)))?;
    match public {
        PublicKey::RSA(rsa) if BigUint::from_bytes_be(rsa.modulus) == *key.n() => Ok(()),
        PublicKey::RSA(_) => Err(Error::InvalidKey("private key does not match the certificate".to_string())),
        _ => Err(Error::InvalidKey("certificate does not carry an RSA public key".to_string())),
    }
}

//! Detached CMS (PKCS#7) SignedData for PDF signatures.
//!
//! The structure follows RFC 5652 with the content omitted:
//!
//! ```text
//! ContentInfo
//!   contentType  id-signedData
//!   content      SignedData
//!     digestAlgorithms   { digest }
//!     encapContentInfo   { id-data, no eContent }
//!     certificates       signer certificate (+ chain)
//!     signerInfos        { IssuerAndSerialNumber, signed attributes,
//!                          rsaEncryption signature over the attributes }
//! ```

use super::signer::ExternalSignature;
use super::types::DigestAlgorithm;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedAttributes, SignedData, SignerIdentifier,
    SignerInfo, SignerInfos,
};
use der::asn1::{Any, GeneralizedTime, ObjectIdentifier, OctetString, SetOfVec, UtcTime};
use der::{Decode, Encode, SliceReader, Tag};
use spki::AlgorithmIdentifierOwned;
use std::time::Duration;
use x509_cert::attr::Attribute;
use x509_cert::Certificate;

const ID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
const ID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
const ID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
const ID_SIGNING_TIME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");
const ID_SIGNING_CERTIFICATE_V2: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.2.47");
const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// Certificates sent along with a signature, signer certificate first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureChain {
    certificates: Vec<Vec<u8>>,
}

impl SignatureChain {
    /// Chain holding only the signer certificate (DER).
    pub fn single(certificate_der: Vec<u8>) -> Self {
        Self {
            certificates: vec![certificate_der],
        }
    }

    /// Chain from DER certificates, signer certificate first.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` when `certificates` is empty.
    pub fn new(certificates: Vec<Vec<u8>>) -> Result<Self> {
        if certificates.is_empty() {
            return Err(Error::InvalidArgument("certificate chain is empty".to_string()));
        }
        Ok(Self { certificates })
    }

    /// DER of the signer certificate.
    pub fn signer_certificate(&self) -> &[u8] {
        &self.certificates[0]
    }

    pub fn certificates(&self) -> &[Vec<u8>] {
        &self.certificates
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Common name of the signer certificate's subject.
    pub fn signer_common_name(&self) -> Option<String> {
        certificate_common_name(self.signer_certificate())
    }
}

/// First CN attribute of a DER certificate's subject.
pub fn certificate_common_name(cert_der: &[u8]) -> Option<String> {
    let (_, cert) = x509_parser::parse_x509_certificate(cert_der).ok()?;
    let cn = cert.subject().iter_common_name().next()?;
    cn.as_str().ok().map(str::to_string)
}

/// Options for [`build_detached_cms`].
#[derive(Debug, Clone, Copy)]
pub struct CmsOptions {
    /// Signing time recorded in the signed attributes
    pub signing_time: DateTime<Utc>,
    /// Add the ESS signing-certificate-v2 attribute (needed for CAdES)
    pub signing_certificate_attribute: bool,
}

/// Build a detached CMS SignedData over `content`.
///
/// The content is hashed with the signature's digest algorithm, the hash
/// goes into the message-digest attribute, and `signature` signs the DER of
/// the signed attributes. The capability is consumed.
///
/// # Errors
///
/// `Error::Signing` when the certificate cannot be decoded, a structure
/// cannot be encoded, or the signature primitive fails.
pub fn build_detached_cms<S: ExternalSignature>(
    signature: S,
    chain: &SignatureChain,
    content: &[u8],
    options: CmsOptions,
) -> Result<Vec<u8>> {
    let digest = signature.digest_algorithm();
    let certificates = chain
        .certificates()
        .iter()
        .map(|der| Certificate::from_der(der))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let signer_cert = &certificates[0];

    let mut attributes = vec![
        attribute(ID_CONTENT_TYPE, Any::encode_from(&ID_DATA)?)?,
        attribute(ID_SIGNING_TIME, encode_time(options.signing_time)?)?,
        attribute(ID_MESSAGE_DIGEST, Any::encode_from(&OctetString::new(digest.digest(content))?)?)?,
    ];
    if options.signing_certificate_attribute {
        attributes.push(attribute(
            ID_SIGNING_CERTIFICATE_V2,
            signing_certificate_v2(chain.signer_certificate())?,
        )?);
    }
    let signed_attrs: SignedAttributes = SetOfVec::try_from(attributes)?;

    let encryption = signature.encryption_algorithm();
    if encryption != "RSA" {
        return Err(Error::Signing(format!("no CMS mapping for {} signatures", encryption)));
    }
    let signature_value = signature.sign(&signed_attrs.to_der()?)?;

    let digest_alg = AlgorithmIdentifierOwned {
        oid: digest.oid(),
        parameters: Some(Any::null()),
    };
    let signer_info = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: signer_cert.tbs_certificate.issuer.clone(),
            serial_number: signer_cert.tbs_certificate.serial_number.clone(),
        }),
        digest_alg: digest_alg.clone(),
        signed_attrs: Some(signed_attrs),
        signature_algorithm: AlgorithmIdentifierOwned {
            oid: RSA_ENCRYPTION,
            parameters: Some(Any::null()),
        },
        signature: OctetString::new(signature_value)?,
        unsigned_attrs: None,
    };

    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::try_from(vec![digest_alg])?,
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: ID_DATA,
            econtent: None,
        },
        certificates: Some(CertificateSet(SetOfVec::try_from(
            certificates
                .into_iter()
                .map(CertificateChoices::Certificate)
                .collect::<Vec<_>>(),
        )?)),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info])?),
    };

    let content_info = ContentInfo {
        content_type: ID_SIGNED_DATA,
        content: Any::encode_from(&signed_data)?,
    };
    let der = content_info.to_der()?;
    log::debug!("Built detached CMS: {} bytes, digest {}", der.len(), digest.name());
    Ok(der)
}

fn attribute(oid: ObjectIdentifier, value: Any) -> Result<Attribute> {
    Ok(Attribute {
        oid,
        values: SetOfVec::try_from(vec![value])?,
    })
}

/// UTCTime for years 1950-2049, GeneralizedTime otherwise (RFC 5652 11.3).
fn encode_time(time: DateTime<Utc>) -> Result<Any> {
    let seconds = u64::try_from(time.timestamp())
        .map_err(|_| Error::Signing(format!("signing time {} precedes 1970", time)))?;
    let since_epoch = Duration::from_secs(seconds);
    match UtcTime::from_unix_duration(since_epoch) {
        Ok(utc) => Ok(Any::encode_from(&utc)?),
        Err(_) => Ok(Any::encode_from(&GeneralizedTime::from_unix_duration(since_epoch)?)?),
    }
}

/// `SigningCertificateV2 ::= SEQUENCE { certs SEQUENCE OF ESSCertIDv2 }` with
/// a single SHA-256 certificate hash (the default hash algorithm, so it is
/// omitted).
fn signing_certificate_v2(cert_der: &[u8]) -> Result<Any> {
    let cert_hash = OctetString::new(DigestAlgorithm::Sha256.digest(cert_der))?;
    let ess_cert_id = Any::new(Tag::Sequence, cert_hash.to_der()?)?;
    let certs = Any::new(Tag::Sequence, ess_cert_id.to_der()?)?;
    Ok(Any::new(Tag::Sequence, certs.to_der()?)?)
}

/// Decode a CMS ContentInfo back into its SignedData.
///
/// Bytes after the ContentInfo, such as the zero padding of a `/Contents`
/// reservation, are ignored.
pub fn parse_signed_data(der: &[u8]) -> Result<SignedData> {
    let mut reader = SliceReader::new(der)?;
    let content_info = ContentInfo::decode(&mut reader)?;
    if content_info.content_type != ID_SIGNED_DATA {
        return Err(Error::Signing(format!(
            "content type {} is not signedData",
            content_info.content_type
        )));
    }
    Ok(SignedData::from_der(&content_info.content.to_der()?)?)
}

/// Message-digest attribute of the first signer, if present.
pub fn message_digest(signed_data: &SignedData) -> Option<Vec<u8>> {
    let signer = signed_data.signer_infos.0.iter().next()?;
    let attrs = signer.signed_attrs.as_ref()?;
    let attr = attrs.iter().find(|a| a.oid == ID_MESSAGE_DIGEST)?;
    let value = attr.values.iter().next()?;
    let octets = OctetString::from_der(&value.to_der().ok()?).ok()?;
    Some(octets.as_bytes().to_vec())
}

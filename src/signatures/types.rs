//! Digital signature types and data structures.

use crate::date::{parse_pdf_date, PdfDate};
use crate::pdf::object::{Dict, Object};
use der::asn1::ObjectIdentifier;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Digest algorithm used for signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// SHA-1 (deprecated, but still common in legacy PDFs)
    Sha1,
    /// SHA-256 (recommended)
    #[default]
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl DigestAlgorithm {
    /// Get the OID for this digest algorithm.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            DigestAlgorithm::Sha1 => ObjectIdentifier::new_unwrap("1.3.14.3.2.26"),
            DigestAlgorithm::Sha256 => ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1"),
            DigestAlgorithm::Sha384 => ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2"),
            DigestAlgorithm::Sha512 => ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3"),
        }
    }

    /// Get the name of this algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Length of the digest in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    /// Hash `data` with this algorithm.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// Signature sub-filter type (signature format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureSubFilter {
    /// adbe.pkcs7.detached - PKCS#7 detached signature
    #[default]
    Pkcs7Detached,
    /// adbe.pkcs7.sha1 - PKCS#7 with SHA-1 digest
    Pkcs7Sha1,
    /// ETSI.CAdES.detached - PAdES CAdES signature
    CadesDetached,
}

impl SignatureSubFilter {
    /// Get the PDF name for this sub-filter.
    pub fn as_pdf_name(&self) -> &'static str {
        match self {
            SignatureSubFilter::Pkcs7Detached => "adbe.pkcs7.detached",
            SignatureSubFilter::Pkcs7Sha1 => "adbe.pkcs7.sha1",
            SignatureSubFilter::CadesDetached => "ETSI.CAdES.detached",
        }
    }

    /// Parse a PDF name into a sub-filter type.
    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "adbe.pkcs7.detached" => Some(SignatureSubFilter::Pkcs7Detached),
            "adbe.pkcs7.sha1" => Some(SignatureSubFilter::Pkcs7Sha1),
            "ETSI.CAdES.detached" => Some(SignatureSubFilter::CadesDetached),
            _ => None,
        }
    }
}

/// Modification policy recorded by a certifying signature (DocMDP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CertificationLevel {
    /// Approval signature; later signatures and changes stay possible
    #[default]
    NotCertified,
    /// No changes of any kind are permitted after signing
    NoChangesAllowed,
    /// Only form filling and further signatures are permitted
    FormFilling,
    /// Form filling, signing and annotation changes are permitted
    FormFillingAndAnnotations,
}

impl CertificationLevel {
    /// `/P` value of the DocMDP transform parameters, `None` for approval
    /// signatures.
    pub fn permissions(&self) -> Option<i64> {
        match self {
            CertificationLevel::NotCertified => None,
            CertificationLevel::NoChangesAllowed => Some(1),
            CertificationLevel::FormFilling => Some(2),
            CertificationLevel::FormFillingAndAnnotations => Some(3),
        }
    }

    pub fn is_certifying(&self) -> bool {
        self.permissions().is_some()
    }
}

/// One of the 14 standard Type 1 fonts usable without embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StandardFont {
    #[default]
    Helvetica,
    HelveticaBold,
    TimesRoman,
    TimesBold,
    Courier,
    CourierBold,
}

impl StandardFont {
    /// `/BaseFont` name.
    pub fn base_font(&self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::TimesRoman => "Times-Roman",
            StandardFont::TimesBold => "Times-Bold",
            StandardFont::Courier => "Courier",
            StandardFont::CourierBold => "Courier-Bold",
        }
    }

    /// Approximate average glyph width as a fraction of the font size.
    pub fn average_width(&self) -> f32 {
        match self {
            StandardFont::Courier | StandardFont::CourierBold => 0.6,
            StandardFont::TimesRoman | StandardFont::TimesBold => 0.45,
            StandardFont::Helvetica | StandardFont::HelveticaBold => 0.5,
        }
    }
}

/// Information about an existing signature in a PDF.
#[derive(Debug, Clone, Default)]
pub struct SignatureInfo {
    /// Fully qualified name of the signature field
    pub field_name: String,
    /// Name of the signer
    pub signer_name: Option<String>,
    /// Signing time as written in `/M`
    pub signing_time: Option<String>,
    /// Reason for signing
    pub reason: Option<String>,
    /// Signing location
    pub location: Option<String>,
    /// Contact information
    pub contact_info: Option<String>,
    /// Signature sub-filter type
    pub sub_filter: Option<SignatureSubFilter>,
    /// Byte range of the signed data
    pub byte_range: Vec<i64>,
    /// Raw `/Contents` (the encoded CMS, zero padded)
    pub contents: Vec<u8>,
    /// Whether the signature dictionary carries a DocMDP reference
    pub certifying: bool,
}

impl SignatureInfo {
    /// Extract signature information from a signature dictionary.
    pub fn from_dict(field_name: &str, dict: &Dict) -> Self {
        let text = |key: &str| dict.get(key).and_then(Object::as_text);
        let certifying = dict
            .get("Reference")
            .and_then(Object::as_array)
            .is_some_and(|refs| {
                refs.iter().any(|r| {
                    r.get("TransformMethod").and_then(Object::as_name) == Some("DocMDP")
                })
            });

        Self {
            field_name: field_name.to_string(),
            signer_name: text("Name"),
            signing_time: text("M"),
            reason: text("Reason"),
            location: text("Location"),
            contact_info: text("ContactInfo"),
            sub_filter: dict
                .get("SubFilter")
                .and_then(Object::as_name)
                .and_then(SignatureSubFilter::from_pdf_name),
            byte_range: dict
                .get("ByteRange")
                .and_then(Object::as_array)
                .map(|items| items.iter().filter_map(Object::as_integer).collect())
                .unwrap_or_default(),
            contents: dict
                .get("Contents")
                .and_then(Object::as_string)
                .map(<[u8]>::to_vec)
                .unwrap_or_default(),
            certifying,
        }
    }

    /// The `/M` entry parsed as a date, if present and well formed.
    pub fn signing_date(&self) -> Option<PdfDate> {
        parse_pdf_date(self.signing_time.as_deref()).ok()
    }

    /// Offset just past the signed data: the end of the second range.
    pub fn signed_length(&self) -> Option<usize> {
        match self.byte_range.as_slice() {
            [_, _, start, len] => usize::try_from(start + len).ok(),
            _ => None,
        }
    }

    /// Whether the byte range covers `file_size` bytes with a single gap.
    pub fn covers_whole_document(&self, file_size: usize) -> bool {
        matches!(self.byte_range.as_slice(), [0, _, _, _]) && self.signed_length() == Some(file_size)
    }
}

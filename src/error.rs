//! Error types for PDF signing.
//!
//! This module defines all error types that can occur while reading the source
//! document, preparing the signature material and writing the signed output.

use crate::pdf::object::ObjectRef;

/// Result type alias for signing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during PDF signing.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// A required input is missing, empty or out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Text does not match the PDF date grammar
    #[error("Invalid PDF date: {0}")]
    Format(String),

    /// No signing certificate was supplied
    #[error("Certificate is missing, nothing to sign with")]
    NullCertificate,

    /// The private key is of a type the signer cannot use
    #[error("Unsupported signing key: {0}")]
    UnsupportedKey(String),

    /// RSA key material is incomplete or inconsistent
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    /// Certificate or key encoding could not be parsed
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Stamp image could not be decoded or encoded
    #[error("Image decoding error: {0}")]
    Decode(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Invalid cross-reference table
    #[error("Invalid cross-reference table")]
    InvalidXref,

    /// Referenced object not found in cross-reference table
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Invalid PDF structure (generic)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Unsupported document feature
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Circular reference detected in object graph
    #[error("Circular reference detected: object {0}")]
    CircularReference(ObjectRef),

    /// CMS assembly or the RSA primitive failed
    #[error("Signing failed: {0}")]
    Signing(String),
}

impl Error {
    /// Whether this error belongs to the document read/write class.
    ///
    /// These failures are reported to signing callers as a `false` result
    /// instead of an error. Argument, certificate, key and image errors are
    /// not in this class and always propagate.
    pub fn is_io_failure(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::InvalidHeader(_)
                | Error::ParseError { .. }
                | Error::InvalidXref
                | Error::ObjectNotFound(..)
                | Error::InvalidObjectType { .. }
                | Error::InvalidPdf(_)
                | Error::Unsupported(_)
                | Error::CircularReference(_)
                | Error::Signing(_)
        )
    }
}

impl From<der::Error> for Error {
    fn from(err: der::Error) -> Self {
        Error::Signing(format!("DER encoding: {}", err))
    }
}

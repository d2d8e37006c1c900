//! PDF digital signature creation.
//!
//! This module adds detached CMS signatures to PDF documents according to
//! ISO 32000-1 section 12.8:
//!
//! - **Signature dictionary** with fixed-width `/ByteRange` and `/Contents`
//!   placeholders patched after the file is assembled
//! - **Appearance**: invisible, description text, or a stamp graphic
//! - **Certification** (DocMDP) for the first signature of a document
//! - **Incremental updates** so additional signatures keep earlier ones valid
//!
//! ## Signature Types Supported
//!
//! - PKCS#7 detached signatures (adbe.pkcs7.detached)
//! - PKCS#7 SHA-1 signatures (adbe.pkcs7.sha1)
//! - PAdES signatures (ETSI.CAdES.detached)
//!
//! ## Example
//!
//! ```ignore
//! use pdf_signet::pdf::PdfDocument;
//! use pdf_signet::signatures::{PdfSigner, SignatureChain, SignatureSubFilter};
//!
//! let doc = PdfDocument::open("document.pdf")?;
//! let output = std::fs::File::create("signed.pdf")?;
//! let mut signer = PdfSigner::open(doc, output, false)?;
//! signer.appearance_mut().set_reason("Approved");
//! signer.sign_detached(capability, &chain, 0, SignatureSubFilter::Pkcs7Detached)?;
//! ```

pub mod appearance;
pub mod byterange;
pub mod cms;
pub mod inspect;
pub mod signer;
pub mod types;

pub use appearance::{RenderingMode, SignatureAppearance};
pub use byterange::ByteRangeCalculator;
pub use cms::{build_detached_cms, CmsOptions, SignatureChain};
pub use inspect::SignatureInspector;
pub use signer::{ExternalSignature, PdfSigner, DEFAULT_ESTIMATED_SIZE};
pub use types::{CertificationLevel, DigestAlgorithm, SignatureInfo, SignatureSubFilter, StandardFont};

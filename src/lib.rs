// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::too_many_arguments)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::new_without_default)]

//! # PDF Signet
//!
//! Detached CMS signatures for existing PDF documents, drawn as an image
//! stamp, a text description, or not at all.
//!
//! ## Core Features
//!
//! - **Certification or approval**: the first signature certifies the
//!   document (DocMDP, no changes allowed); later signatures are appended
//!   as incremental updates so earlier ones stay valid
//! - **Stamp images**: any raster format the `image` crate decodes, resized
//!   to the configured stamp size and flattened onto white
//! - **Placement**: top-right anchored rectangle with configurable margins
//! - **PDF dates**: `D:YYYYMMDDHHmmSS+HH'mm'` parsing and formatting
//! - **RSA keys** from PKCS#8 or PKCS#1 PEM, SHA-1/SHA-2 digests
//!
//! ## Architecture
//!
//! - [`orchestrator`]: the signing state machine ([`StampSigner`])
//! - [`material`]: certificates, keys and the signing capability
//! - [`stamp`] and [`layout`]: stamp image and rectangle
//! - [`date`]: PDF date strings
//! - [`signatures`]: signature dictionary, appearance, byte ranges and CMS
//! - [`pdf`]: the object model, parser and writers underneath
//!
//! ## Quick Start
//!
//! ```ignore
//! use pdf_signet::{SignerConfig, SigningCredentials, SigningRequest, StampSigner, StampImage};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = SigningCredentials::from_pem_files("signer.pem", "signer.key")?;
//! let request = SigningRequest::new(std::fs::read("contract.pdf")?)
//!     .with_reason("Approved")
//!     .with_location("Warsaw")
//!     .with_visible(true)
//!     .with_stamp(StampImage::from_file("stamp.png")?)
//!     .with_certificate(credentials);
//!
//! let mut signer = StampSigner::for_path("contract-signed.pdf", SignerConfig::default());
//! if !signer.sign(&request)? {
//!     eprintln!("document could not be signed");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of:
//!
//! * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//! * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.

// Error handling
pub mod error;

// Configuration
pub mod config;

// Stamp components
pub mod date;
pub mod layout;
pub mod stamp;

// PDF object model, parsing and writing
pub mod pdf;

// Signature creation
pub mod signatures;

// Certificates and keys
pub mod material;

// Signing state machine
pub mod orchestrator;

// Re-exports
pub use config::SignerConfig;
pub use date::{format_pdf_date, parse_pdf_date, PdfDate};
pub use error::{Error, Result};
pub use layout::{place, StampGeometry, StampLayout, VerticalAnchor};
pub use material::{derive, PrivateKeyMaterial, SigningCapability, SigningCredentials};
pub use orchestrator::{OutputTarget, SigningRequest, SigningState, StampSigner};
pub use pdf::PdfDocument;
pub use signatures::{CertificationLevel, DigestAlgorithm, SignatureChain, SignatureInfo};
pub use stamp::{ImageNormalizer, NormalizedStamp, StampImage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "pdf_signet");
    }
}

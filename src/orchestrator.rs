//! End-to-end stamp signing.
//!
//! [`StampSigner`] takes a [`SigningRequest`] through a fixed sequence of
//! states:
//!
//! ```text
//! Validating -> OutputReady -> ModeSelected -> AppearanceConfigured -> Signed
//!      \______________\______________\_________________\_____________-> Failed
//! ```
//!
//! Failures are reported on two channels. A missing certificate and any
//! argument, key or image error is returned as `Err`. A missing output
//! target and any failure to read or write the document yields `Ok(false)`.
//! Callers depend on the distinction.
//!
//! # Example
//!
//! ```ignore
//! use pdf_signet::{SignerConfig, SigningCredentials, SigningRequest, StampSigner};
//!
//! let credentials = SigningCredentials::from_pem_files("cert.pem", "key.pem")?;
//! let request = SigningRequest::new(std::fs::read("in.pdf")?)
//!     .with_reason("Approved")
//!     .with_visible(true)
//!     .with_certificate(credentials);
//!
//! let mut signer = StampSigner::for_path("out.pdf", SignerConfig::default());
//! assert!(signer.sign(&request)?);
//! ```

use crate::config::SignerConfig;
use crate::date::{format_pdf_date, PdfDate};
use crate::error::{Error, Result};
use crate::layout::StampLayout;
use crate::material::{derive, SigningCredentials};
use crate::pdf::PdfDocument;
use crate::signatures::{CertificationLevel, PdfSigner, RenderingMode, SignatureInspector, SignatureSubFilter};
use crate::stamp::{ImageNormalizer, StampImage};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Where the signed document is written.
pub enum OutputTarget {
    /// File created (or truncated) when signing starts
    FilePath(PathBuf),
    /// Caller-supplied stream, dropped when signing ends
    Stream(Box<dyn Write + Send>),
}

impl OutputTarget {
    /// Target for a file path; `None` for an empty path.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            None
        } else {
            Some(OutputTarget::FilePath(path.to_path_buf()))
        }
    }

    /// Target for an open stream.
    pub fn from_stream(stream: impl Write + Send + 'static) -> Self {
        OutputTarget::Stream(Box::new(stream))
    }

    fn open(self) -> Result<Box<dyn Write + Send>> {
        match self {
            OutputTarget::FilePath(path) => {
                let file = File::create(&path)?;
                log::debug!("Created output file {}", path.display());
                Ok(Box::new(BufWriter::new(file)))
            },
            OutputTarget::Stream(stream) => Ok(stream),
        }
    }
}

impl fmt::Debug for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::FilePath(path) => f.debug_tuple("FilePath").field(path).finish(),
            OutputTarget::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Progress of one signing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningState {
    /// Not started
    Idle,
    /// Checking the certificate and the output target
    Validating,
    /// Output open, reading the source document
    OutputReady,
    /// Append or direct mode chosen
    ModeSelected,
    /// Appearance and metadata set
    AppearanceConfigured,
    /// Signed document written
    Signed,
    /// The call failed
    Failed,
}

impl fmt::Display for SigningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SigningState::Idle => "idle",
            SigningState::Validating => "validating",
            SigningState::OutputReady => "output-ready",
            SigningState::ModeSelected => "mode-selected",
            SigningState::AppearanceConfigured => "appearance-configured",
            SigningState::Signed => "signed",
            SigningState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything needed for one signature.
#[derive(Debug, Clone)]
pub struct SigningRequest {
    /// Reason for signing
    pub reason: String,
    /// Signer contact information
    pub contact: String,
    /// Signing location
    pub location: String,
    /// Draw the signature on the page
    pub visible: bool,
    /// Stamp graphic for visible signatures
    pub stamp: Option<StampImage>,
    /// Signer certificate and key
    pub certificate: Option<SigningCredentials>,
    /// The document to sign
    pub source: Vec<u8>,
    /// Name of the signing application
    pub signature_creator: String,
    /// Description text; empty selects the signer's name
    pub image_text: String,
    /// Add the signing date below the description text
    pub append_sign_date: bool,
    /// 1-based page for the stamp and the widget
    pub page_number: usize,
}

impl SigningRequest {
    /// Request to sign `source` with default options.
    pub fn new(source: impl Into<Vec<u8>>) -> Self {
        Self {
            reason: String::new(),
            contact: String::new(),
            location: String::new(),
            visible: false,
            stamp: None,
            certificate: None,
            source: source.into(),
            signature_creator: String::new(),
            image_text: String::new(),
            append_sign_date: true,
            page_number: 1,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = contact.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_stamp(mut self, stamp: StampImage) -> Self {
        self.stamp = Some(stamp);
        self
    }

    pub fn with_certificate(mut self, certificate: SigningCredentials) -> Self {
        self.certificate = Some(certificate);
        self
    }

    pub fn with_signature_creator(mut self, creator: impl Into<String>) -> Self {
        self.signature_creator = creator.into();
        self
    }

    pub fn with_image_text(mut self, text: impl Into<String>) -> Self {
        self.image_text = text.into();
        self
    }

    pub fn with_append_sign_date(mut self, append: bool) -> Self {
        self.append_sign_date = append;
        self
    }

    pub fn with_page_number(mut self, page_number: usize) -> Self {
        self.page_number = page_number;
        self
    }
}

/// Description text drawn in a visible signature without a stamp image.
pub fn layer2_text(image_text: &str, common_name: Option<&str>, sign_date: Option<&PdfDate>) -> String {
    let mut text = if image_text.is_empty() {
        format!("Digitally signed by {}", common_name.unwrap_or("unknown signer"))
    } else {
        image_text.to_string()
    };
    if let Some(date) = sign_date {
        text.push('\n');
        text.push_str(&format_pdf_date(date));
    }
    text
}

/// Signs one document into one output target.
pub struct StampSigner {
    output: Option<OutputTarget>,
    config: SignerConfig,
    state: SigningState,
}

impl fmt::Debug for StampSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StampSigner")
            .field("output", &self.output)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl StampSigner {
    pub fn new(output: Option<OutputTarget>, config: SignerConfig) -> Self {
        Self {
            output,
            config,
            state: SigningState::Idle,
        }
    }

    /// Signer writing to `path`. An empty path leaves it without a target.
    pub fn for_path(path: impl AsRef<Path>, config: SignerConfig) -> Self {
        Self::new(OutputTarget::from_path(path), config)
    }

    /// Signer writing to an open stream.
    pub fn for_stream(stream: impl Write + Send + 'static, config: SignerConfig) -> Self {
        Self::new(Some(OutputTarget::from_stream(stream)), config)
    }

    pub fn config(&self) -> &SignerConfig {
        &self.config
    }

    /// State reached by the last call.
    pub fn state(&self) -> SigningState {
        self.state
    }

    fn transition(&mut self, next: SigningState) {
        log::debug!("Signing state {} -> {}", self.state, next);
        self.state = next;
    }

    /// Sign the request's document into the output target.
    ///
    /// The output target is consumed by the first call and released before
    /// this returns, whatever the outcome. Later calls return `Ok(false)`.
    ///
    /// # Errors
    ///
    /// - `Error::NullCertificate` when the request has no certificate,
    ///   before the output is opened
    /// - `Error::UnsupportedKey`, `Error::InvalidKey`, `Error::Certificate`
    ///   from key derivation
    /// - `Error::InvalidArgument` for a bad configuration or page number
    /// - `Error::Decode` for an unreadable stamp image
    ///
    /// Document read and write failures are returned as `Ok(false)`.
    pub fn sign(&mut self, request: &SigningRequest) -> Result<bool> {
        self.transition(SigningState::Validating);
        let Some(credentials) = request.certificate.as_ref() else {
            self.transition(SigningState::Failed);
            return Err(Error::NullCertificate);
        };
        if let Err(e) = self.config.validate() {
            self.transition(SigningState::Failed);
            return Err(e);
        }

        let Some(target) = self.output.take() else {
            log::warn!("No output target, nothing signed");
            self.transition(SigningState::Failed);
            return Ok(false);
        };
        let mut output = match target.open() {
            Ok(output) => output,
            Err(e) => {
                log::warn!("Cannot open output: {}", e);
                self.transition(SigningState::Failed);
                return Ok(false);
            },
        };

        let result = self.sign_into(&mut output, request, credentials);
        drop(output);

        match result {
            Ok(()) => {
                self.transition(SigningState::Signed);
                Ok(true)
            },
            Err(e) if e.is_io_failure() => {
                log::warn!("Signing failed: {}", e);
                self.transition(SigningState::Failed);
                Ok(false)
            },
            Err(e) => {
                log::error!("Signing aborted: {}", e);
                self.transition(SigningState::Failed);
                Err(e)
            },
        }
    }

    fn sign_into(
        &mut self,
        output: &mut Box<dyn Write + Send>,
        request: &SigningRequest,
        credentials: &SigningCredentials,
    ) -> Result<()> {
        self.transition(SigningState::OutputReady);
        let document = PdfDocument::from_bytes(request.source.as_slice())?;

        let existing = SignatureInspector::new(&document).signature_count()?;
        let append = existing > 0;
        let level = if append {
            CertificationLevel::NotCertified
        } else {
            CertificationLevel::NoChangesAllowed
        };
        self.transition(SigningState::ModeSelected);
        log::info!(
            "Source has {} signature(s), signing in {} mode",
            existing,
            if append { "append" } else { "direct" }
        );

        let page_count = document.page_count()?;
        if request.page_number == 0 || request.page_number > page_count {
            return Err(Error::InvalidArgument(format!(
                "page {} is outside the document ({} pages)",
                request.page_number, page_count
            )));
        }
        let page_size = document.page_size(request.page_number - 1)?;

        let sign_date = PdfDate::now();
        let mut signer = PdfSigner::open(document, output, append)?;
        signer.set_sign_date(sign_date).set_certification_level(level);

        let appearance = signer.appearance_mut();
        appearance
            .set_reason(request.reason.as_str())
            .set_contact(request.contact.as_str())
            .set_location(request.location.as_str())
            .set_signature_creator(request.signature_creator.as_str())
            .set_page_number(request.page_number);

        if request.visible {
            let geometry = StampLayout::from_config(&self.config).geometry(page_size.0, page_size.1);
            appearance.set_page_rect(geometry.to_rect());

            match &request.stamp {
                Some(stamp) => {
                    let normalized = ImageNormalizer::from_config(&self.config).normalize(stamp)?;
                    appearance
                        .set_signature_graphic(normalized)
                        .set_rendering_mode(RenderingMode::Graphic);
                },
                None => {
                    let text = layer2_text(
                        &request.image_text,
                        credentials.common_name().as_deref(),
                        request.append_sign_date.then_some(&sign_date),
                    );
                    appearance
                        .set_rendering_mode(RenderingMode::Description)
                        .set_layer2_font(self.config.font)
                        .set_layer2_font_size(self.config.font_size)
                        .set_layer2_text(text);
                },
            }
        }
        self.transition(SigningState::AppearanceConfigured);

        let (capability, chain) = derive(Some(credentials), self.config.digest)?;
        signer.sign_detached(
            capability,
            &chain,
            self.config.estimated_signature_size,
            SignatureSubFilter::Pkcs7Detached,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_output_target_from_path() {
        assert!(OutputTarget::from_path("").is_none());
        assert!(matches!(
            OutputTarget::from_path("out.pdf"),
            Some(OutputTarget::FilePath(_))
        ));
    }

    #[test]
    fn test_layer2_text() {
        assert_eq!(layer2_text("", Some("Jan Kowalski"), None), "Digitally signed by Jan Kowalski");
        assert_eq!(layer2_text("Approved", Some("Jan Kowalski"), None), "Approved");

        let date = PdfDate::local(
            NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(3, 4, 5)
                .unwrap(),
        );
        assert_eq!(layer2_text("Approved", None, Some(&date)), "Approved\nD:20240102030405");
    }

    #[test]
    fn test_request_defaults() {
        let request = SigningRequest::new(b"%PDF".to_vec());
        assert!(request.append_sign_date);
        assert_eq!(request.page_number, 1);
        assert!(!request.visible);
        assert!(request.certificate.is_none());
    }

    #[test]
    fn test_missing_certificate_fails_before_output() {
        let mut signer = StampSigner::for_stream(Vec::new(), SignerConfig::default());
        let err = signer.sign(&SigningRequest::new(Vec::new())).unwrap_err();
        assert!(matches!(err, Error::NullCertificate));
        assert_eq!(signer.state(), SigningState::Failed);
        assert!(signer.output.is_some());
    }

    #[test]
    fn test_missing_output_returns_false() {
        let credentials = SigningCredentials::from_pem(
            include_bytes!("../tests/fixtures/rsa_cert.pem"),
            include_bytes!("../tests/fixtures/rsa_key.pem"),
        )
        .unwrap();
        let request = SigningRequest::new(Vec::new()).with_certificate(credentials);
        let mut signer = StampSigner::new(None, SignerConfig::default());
        assert!(!signer.sign(&request).unwrap());
        assert_eq!(signer.state(), SigningState::Failed);
    }
}

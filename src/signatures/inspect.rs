//! Read-only queries about the signatures a document already carries.
//!
//! Used before signing to pick the writing mode. Nothing here verifies a
//! signature cryptographically.

use super::types::SignatureInfo;
use crate::error::Result;
use crate::pdf::document::PdfDocument;

/// Signature queries over one document.
pub struct SignatureInspector<'a> {
    doc: &'a PdfDocument,
}

impl<'a> SignatureInspector<'a> {
    pub fn new(doc: &'a PdfDocument) -> Self {
        Self { doc }
    }

    /// Names of the signed signature fields, in form order.
    pub fn signature_names(&self) -> Result<Vec<String>> {
        self.doc.signature_names()
    }

    pub fn signature_count(&self) -> Result<usize> {
        Ok(self.signature_names()?.len())
    }

    pub fn has_signatures(&self) -> Result<bool> {
        Ok(self.signature_count()? > 0)
    }

    pub fn signature(&self, name: &str) -> Result<Option<SignatureInfo>> {
        self.doc.signature(name)
    }

    /// Whether the named signature covers every byte of the file.
    ///
    /// Only the newest signature of a document with incremental updates
    /// does; earlier ones cover the revision they were made on.
    pub fn covers_whole_document(&self, name: &str) -> Result<bool> {
        Ok(self
            .signature(name)?
            .is_some_and(|info| info.covers_whole_document(self.doc.data().len())))
    }

    /// The file as it was when the named signature was applied.
    pub fn signed_revision(&self, name: &str) -> Result<Option<&'a [u8]>> {
        let data = self.doc.data();
        Ok(self
            .signature(name)?
            .and_then(|info| info.signed_length())
            .and_then(|len| data.get(..len)))
    }

    /// Number of revisions: one per `%%EOF` marker.
    pub fn total_revisions(&self) -> usize {
        self.doc
            .data()
            .windows(5)
            .filter(|w| *w == b"%%EOF")
            .count()
    }
}

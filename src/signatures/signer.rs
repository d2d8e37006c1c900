//! PDF signing implementation.
//!
//! [`PdfSigner`] adds one signature to an opened document. The new objects
//! (signature dictionary, merged field/widget, appearance streams) are
//! written either as an incremental update after the original bytes or as a
//! full rewrite of the document. The `/ByteRange` and `/Contents` values are
//! written as fixed-width placeholders, located in the output, and then
//! patched in place so the offsets of everything else stay stable.

use super::appearance::SignatureAppearance;
use super::byterange::ByteRangeCalculator;
use super::cms::{build_detached_cms, CmsOptions, SignatureChain};
use super::types::{CertificationLevel, DigestAlgorithm, SignatureSubFilter};
use crate::date::PdfDate;
use crate::error::{Error, Result};
use crate::pdf::document::PdfDocument;
use crate::pdf::object::{Dict, Object, ObjectRef};
use crate::pdf::serializer::ObjectSerializer;
use crate::pdf::writer::{DocumentUpdate, FullRewriteWriter, IncrementalWriter, WrittenDocument};
use chrono::Utc;
use std::io::Write;

/// Reservation used when the caller passes an estimated size of 0.
pub const DEFAULT_ESTIMATED_SIZE: usize = 8192;

/// Annotation flags of the signature widget: Print and Locked.
const WIDGET_FLAGS: i64 = 132;

/// AcroForm `/SigFlags`: SignaturesExist and AppendOnly.
const SIG_FLAGS: i64 = 3;

/// A private-key operation that produces the raw signature value.
///
/// Implementations are consumed by [`sign`](ExternalSignature::sign), so a
/// capability signs exactly one message.
pub trait ExternalSignature {
    /// Digest applied to the message before the key operation.
    fn digest_algorithm(&self) -> DigestAlgorithm;

    /// Name of the key algorithm, e.g. `"RSA"`.
    fn encryption_algorithm(&self) -> &'static str;

    /// Sign `message`: hash it with the digest algorithm and apply the key.
    fn sign(self, message: &[u8]) -> Result<Vec<u8>>;
}

/// Adds a detached signature to a document and writes the result.
pub struct PdfSigner<W: Write> {
    document: PdfDocument,
    output: W,
    append: bool,
    sign_date: PdfDate,
    certification_level: CertificationLevel,
    appearance: SignatureAppearance,
    field_name: Option<String>,
}

impl<W: Write> PdfSigner<W> {
    /// Prepare to sign `document` into `output`.
    ///
    /// With `append` the original bytes are kept and the signature is added
    /// as an incremental update, which leaves earlier signatures valid.
    /// Otherwise the document is rewritten from its live objects.
    ///
    /// # Errors
    ///
    /// `Error::Unsupported` for encrypted documents.
    pub fn open(document: PdfDocument, output: W, append: bool) -> Result<Self> {
        if document.is_encrypted() {
            return Err(Error::Unsupported("signing encrypted documents".to_string()));
        }
        Ok(Self {
            document,
            output,
            append,
            sign_date: PdfDate::now(),
            certification_level: CertificationLevel::NotCertified,
            appearance: SignatureAppearance::default(),
            field_name: None,
        })
    }

    pub fn set_sign_date(&mut self, date: PdfDate) -> &mut Self {
        self.sign_date = date;
        self
    }

    pub fn sign_date(&self) -> PdfDate {
        self.sign_date
    }

    pub fn set_certification_level(&mut self, level: CertificationLevel) -> &mut Self {
        self.certification_level = level;
        self
    }

    pub fn certification_level(&self) -> CertificationLevel {
        self.certification_level
    }

    pub fn appearance(&self) -> &SignatureAppearance {
        &self.appearance
    }

    pub fn appearance_mut(&mut self) -> &mut SignatureAppearance {
        &mut self.appearance
    }

    /// Name of the new signature field. Defaults to the first free
    /// `SignatureN`.
    pub fn set_field_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.field_name = Some(name.into());
        self
    }

    pub fn document(&self) -> &PdfDocument {
        &self.document
    }

    /// Sign the document with a detached CMS signature and write it out.
    ///
    /// `estimated_size` is the number of bytes reserved for the encoded CMS
    /// (0 selects [`DEFAULT_ESTIMATED_SIZE`]). The signer is consumed.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` for a page number outside the document,
    /// `Error::Signing` when the CMS does not fit the reservation or cannot
    /// be built, and any read or write error of the document.
    pub fn sign_detached<S: ExternalSignature>(
        mut self,
        capability: S,
        chain: &SignatureChain,
        estimated_size: usize,
        sub_filter: SignatureSubFilter,
    ) -> Result<()> {
        let estimated_size = if estimated_size == 0 {
            DEFAULT_ESTIMATED_SIZE
        } else {
            estimated_size
        };
        let calculator = ByteRangeCalculator::new(estimated_size);

        let page_index = self.page_index()?;
        let page_ref = self.document.page_ref(page_index)?;
        let field_name = match self.field_name.take() {
            Some(name) => name,
            None => self.next_field_name()?,
        };

        let mut update = DocumentUpdate::new(&self.document);
        let sig_ref = update.add(self.signature_dictionary(&calculator, chain, sub_filter));

        let image_ref = self.appearance.image_xobject().map(|image| update.add(image));
        let form_ref = update.add(self.appearance.build_form(image_ref));
        let field_ref = update.add(self.signature_field(&field_name, sig_ref, page_ref, form_ref));

        self.add_to_page(&mut update, page_ref, field_ref)?;
        self.add_to_form(&mut update, field_ref, sig_ref)?;

        let written = if self.append {
            IncrementalWriter::new(&self.document).write(&update)?
        } else {
            FullRewriteWriter::new(&self.document).write(&update)?
        };
        log::debug!(
            "Wrote {} objects for field {} ({} mode, {} bytes)",
            update.len(),
            field_name,
            if self.append { "append" } else { "direct" },
            written.bytes.len()
        );

        let options = CmsOptions {
            signing_time: self.sign_date.to_datetime()?.with_timezone(&Utc),
            signing_certificate_attribute: sub_filter == SignatureSubFilter::CadesDetached,
        };
        let bytes = seal(written, sig_ref, &calculator, |signed| {
            build_detached_cms(capability, chain, signed, options)
        })?;

        self.output.write_all(&bytes)?;
        self.output.flush()?;
        log::info!("Signed field {} ({} bytes)", field_name, bytes.len());
        Ok(())
    }

    fn page_index(&self) -> Result<usize> {
        let number = self.appearance.page_number();
        let count = self.document.page_count()?;
        if number == 0 || number > count {
            return Err(Error::InvalidArgument(format!(
                "page {} is outside the document ({} pages)",
                number, count
            )));
        }
        Ok(number - 1)
    }

    fn next_field_name(&self) -> Result<String> {
        let taken = self.document.field_names()?;
        let name = (1..)
            .map(|n| format!("Signature{}", n))
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or_default();
        Ok(name)
    }

    fn signature_dictionary(
        &self,
        calculator: &ByteRangeCalculator,
        chain: &SignatureChain,
        sub_filter: SignatureSubFilter,
    ) -> Object {
        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::name("Sig"));
        dict.insert("Filter".to_string(), Object::name("Adobe.PPKLite"));
        dict.insert("SubFilter".to_string(), Object::name(sub_filter.as_pdf_name()));
        dict.insert("ByteRange".to_string(), ByteRangeCalculator::byte_range_placeholder());
        dict.insert("Contents".to_string(), calculator.contents_placeholder());
        dict.insert("M".to_string(), Object::text(&self.sign_date.format()));

        if let Some(name) = chain.signer_common_name() {
            dict.insert("Name".to_string(), Object::text(&name));
        }
        let optional = [
            ("Reason", self.appearance.reason()),
            ("ContactInfo", self.appearance.contact()),
            ("Location", self.appearance.location()),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                dict.insert(key.to_string(), Object::text(value));
            }
        }
        if let Some(creator) = self.appearance.signature_creator() {
            dict.insert(
                "Prop_Build".to_string(),
                ObjectSerializer::dict(vec![(
                    "App",
                    ObjectSerializer::dict(vec![("Name", Object::name(creator))]),
                )]),
            );
        }

        if let Some(permissions) = self.certification_level.permissions() {
            let params = ObjectSerializer::dict(vec![
                ("Type", Object::name("TransformParams")),
                ("P", Object::Integer(permissions)),
                ("V", Object::name("1.2")),
            ]);
            let reference = ObjectSerializer::dict(vec![
                ("Type", Object::name("SigRef")),
                ("TransformMethod", Object::name("DocMDP")),
                ("TransformParams", params),
            ]);
            dict.insert("Reference".to_string(), Object::Array(vec![reference]));
        }

        Object::Dictionary(dict)
    }

    fn signature_field(&self, name: &str, sig_ref: ObjectRef, page_ref: ObjectRef, form_ref: ObjectRef) -> Object {
        ObjectSerializer::dict(vec![
            ("FT", Object::name("Sig")),
            ("T", Object::text(name)),
            ("V", Object::Reference(sig_ref)),
            ("Type", Object::name("Annot")),
            ("Subtype", Object::name("Widget")),
            ("F", Object::Integer(WIDGET_FLAGS)),
            ("P", Object::Reference(page_ref)),
            ("Rect", ObjectSerializer::rect(self.appearance.widget_rect())),
            ("AP", ObjectSerializer::dict(vec![("N", Object::Reference(form_ref))])),
        ])
    }

    /// Append the widget to the page's `/Annots`.
    fn add_to_page(&self, update: &mut DocumentUpdate, page_ref: ObjectRef, field_ref: ObjectRef) -> Result<()> {
        let mut page = current(&self.document, update, page_ref)?;
        let page_dict = page.as_dict_mut().ok_or_else(|| Error::InvalidObjectType {
            expected: "Dictionary".to_string(),
            found: "page without dictionary".to_string(),
        })?;
        let annots = page_dict.get("Annots").cloned();
        if let Some(array_ref) = push_to_array(&self.document, update, annots, Object::Reference(field_ref), |array| {
            page_dict.insert("Annots".to_string(), array);
        })? {
            log::debug!("Extended indirect /Annots {}", array_ref);
        }
        update.set(page_ref, page);
        Ok(())
    }

    /// Register the field in the AcroForm, creating it when missing, and
    /// point the catalog's `/Perms /DocMDP` at certifying signatures.
    fn add_to_form(&self, update: &mut DocumentUpdate, field_ref: ObjectRef, sig_ref: ObjectRef) -> Result<()> {
        let catalog_ref = self.document.catalog_ref()?;
        let mut catalog = current(&self.document, update, catalog_ref)?;
        let catalog_dict = catalog.as_dict_mut().ok_or_else(|| Error::InvalidObjectType {
            expected: "Dictionary".to_string(),
            found: "catalog without dictionary".to_string(),
        })?;

        let form_ref = catalog_dict.get("AcroForm").and_then(Object::as_reference);
        let mut form = match (form_ref, catalog_dict.get("AcroForm")) {
            (Some(form_ref), _) => current(&self.document, update, form_ref)?,
            (None, Some(direct)) => direct.clone(),
            (None, None) => Object::Dictionary(Dict::new()),
        };
        let form_dict = form.as_dict_mut().ok_or_else(|| Error::InvalidObjectType {
            expected: "Dictionary".to_string(),
            found: "/AcroForm".to_string(),
        })?;
        let fields = form_dict.get("Fields").cloned();
        push_to_array(&self.document, update, fields, Object::Reference(field_ref), |array| {
            form_dict.insert("Fields".to_string(), array);
        })?;
        form_dict.insert("SigFlags".to_string(), Object::Integer(SIG_FLAGS));

        match form_ref {
            Some(form_ref) => update.set(form_ref, form),
            None => {
                catalog_dict.insert("AcroForm".to_string(), form);
            },
        }
        if self.certification_level.is_certifying() {
            catalog_dict.insert(
                "Perms".to_string(),
                ObjectSerializer::dict(vec![("DocMDP", Object::Reference(sig_ref))]),
            );
        }
        update.set(catalog_ref, catalog);
        Ok(())
    }
}

/// The object as it will be written: the pending version if the update
/// already changed it, the document's otherwise.
fn current(doc: &PdfDocument, update: &DocumentUpdate, obj_ref: ObjectRef) -> Result<Object> {
    match update.get(obj_ref) {
        Some(object) => Ok(object.clone()),
        None => doc.load_object(obj_ref),
    }
}

/// Append `item` to an array value that may be missing, direct or indirect.
///
/// Direct and missing arrays are handed to `store` so the owner can put the
/// new array in place. An indirect array is replaced in `update` and its
/// reference returned.
fn push_to_array(
    doc: &PdfDocument,
    update: &mut DocumentUpdate,
    value: Option<Object>,
    item: Object,
    store: impl FnOnce(Object),
) -> Result<Option<ObjectRef>> {
    match value {
        Some(Object::Reference(array_ref)) => {
            let mut items = match current(doc, update, array_ref)? {
                Object::Array(items) => items,
                other => {
                    return Err(Error::InvalidObjectType {
                        expected: "Array".to_string(),
                        found: other.type_name().to_string(),
                    })
                },
            };
            items.push(item);
            update.set(array_ref, Object::Array(items));
            Ok(Some(array_ref))
        },
        Some(Object::Array(mut items)) => {
            items.push(item);
            store(Object::Array(items));
            Ok(None)
        },
        Some(Object::Null) | None => {
            store(Object::Array(vec![item]));
            Ok(None)
        },
        Some(other) => Err(Error::InvalidObjectType {
            expected: "Array".to_string(),
            found: other.type_name().to_string(),
        }),
    }
}

/// Patch the byte range into the written document, sign the covered bytes
/// with `sign` and embed the result in `/Contents`.
fn seal(
    written: WrittenDocument,
    sig_ref: ObjectRef,
    calculator: &ByteRangeCalculator,
    sign: impl FnOnce(&[u8]) -> Result<Vec<u8>>,
) -> Result<Vec<u8>> {
    let (start, object) = written
        .object_bytes(sig_ref)
        .ok_or_else(|| Error::Signing(format!("signature dictionary {} was not written", sig_ref)))?;
    let contents_offset =
        ByteRangeCalculator::find_placeholder(object, start, "Contents", &calculator.generate_placeholder())
            .ok_or_else(|| Error::Signing("/Contents placeholder not found".to_string()))?;
    let byte_range_offset = ByteRangeCalculator::find_placeholder(
        object,
        start,
        "ByteRange",
        &ByteRangeCalculator::generate_byte_range_placeholder(),
    )
    .ok_or_else(|| Error::Signing("/ByteRange placeholder not found".to_string()))?;

    let mut bytes = written.bytes;
    let byte_range = calculator.calculate_byte_range(bytes.len(), contents_offset);
    ByteRangeCalculator::patch_byte_range(&mut bytes, byte_range_offset, &byte_range)?;

    let signed = ByteRangeCalculator::extract_signed_bytes(&bytes, &byte_range)?;
    let cms = sign(&signed)?;
    calculator.insert_signature(&mut bytes, contents_offset, &cms)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::testing::{build_pdf, build_xref_stream_pdf};
    use crate::signatures::cms::parse_signed_data;
    use chrono::{FixedOffset, NaiveDate};

    /// Signs by hashing only, enough to exercise the CMS plumbing.
    struct DigestOnly;

    impl ExternalSignature for DigestOnly {
        fn digest_algorithm(&self) -> DigestAlgorithm {
            DigestAlgorithm::Sha256
        }

        fn encryption_algorithm(&self) -> &'static str {
            "RSA"
        }

        fn sign(self, message: &[u8]) -> Result<Vec<u8>> {
            Ok(DigestAlgorithm::Sha256.digest(message))
        }
    }

    fn chain() -> SignatureChain {
        let pem = include_str!("../../tests/fixtures/rsa_cert.pem");
        let (_, pem) = x509_parser::pem::parse_x509_pem(pem.as_bytes()).unwrap();
        SignatureChain::single(pem.contents)
    }

    fn sample() -> Vec<u8> {
        build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 612 792] >>",
                "<< /Type /Page /Parent 2 0 R >>",
            ],
            "",
        )
    }

    fn fixed_date() -> PdfDate {
        let naive = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        PdfDate::with_offset(naive, FixedOffset::east_opt(3600).unwrap())
    }

    fn sign(source: Vec<u8>, append: bool, level: CertificationLevel) -> Vec<u8> {
        let doc = PdfDocument::from_bytes(source).unwrap();
        let mut out = Vec::new();
        let mut signer = PdfSigner::open(doc, &mut out, append).unwrap();
        signer.set_sign_date(fixed_date()).set_certification_level(level);
        signer
            .appearance_mut()
            .set_reason("Approved")
            .set_location("Warsaw")
            .set_signature_creator("Signet");
        signer
            .sign_detached(DigestOnly, &chain(), 0, SignatureSubFilter::Pkcs7Detached)
            .unwrap();
        out
    }

    #[test]
    fn test_first_signature_certifies() {
        let signed = sign(sample(), false, CertificationLevel::NoChangesAllowed);
        let doc = PdfDocument::from_bytes(signed.clone()).unwrap();

        assert_eq!(doc.signature_names().unwrap(), vec!["Signature1".to_string()]);
        let info = doc.signature("Signature1").unwrap().unwrap();
        assert!(info.covers_whole_document(signed.len()));
        assert!(info.certifying);
        assert_eq!(info.reason.as_deref(), Some("Approved"));
        assert_eq!(info.signer_name.as_deref(), Some("Test Signer"));
        assert_eq!(info.signing_time.as_deref(), Some("D:20240315103000+01'00'"));
        assert_eq!(info.contents.len(), DEFAULT_ESTIMATED_SIZE);

        let catalog = doc.catalog().unwrap();
        assert!(catalog.get("Perms").and_then(|p| p.get("DocMDP")).is_some());
        let form = doc.acroform().unwrap().unwrap();
        assert_eq!(form.get("SigFlags").and_then(Object::as_integer), Some(3));
    }

    #[test]
    fn test_embedded_cms_matches_signed_bytes() {
        let signed = sign(sample(), false, CertificationLevel::NotCertified);
        let doc = PdfDocument::from_bytes(signed.clone()).unwrap();
        let info = doc.signature("Signature1").unwrap().unwrap();

        let range: [i64; 4] = info.byte_range.clone().try_into().unwrap();
        let covered = ByteRangeCalculator::extract_signed_bytes(&signed, &range).unwrap();
        let signed_data = parse_signed_data(&info.contents).unwrap();
        assert_eq!(
            crate::signatures::cms::message_digest(&signed_data),
            Some(DigestAlgorithm::Sha256.digest(&covered))
        );
        assert!(!info.certifying);
    }

    #[test]
    fn test_second_signature_is_appended() {
        let first = sign(sample(), false, CertificationLevel::NoChangesAllowed);
        let second = sign(first.clone(), true, CertificationLevel::NotCertified);

        assert!(second.starts_with(&first));
        let doc = PdfDocument::from_bytes(second.clone()).unwrap();
        assert_eq!(
            doc.signature_names().unwrap(),
            vec!["Signature1".to_string(), "Signature2".to_string()]
        );
        let older = doc.signature("Signature1").unwrap().unwrap();
        assert!(older.covers_whole_document(first.len()));
        let newer = doc.signature("Signature2").unwrap().unwrap();
        assert!(newer.covers_whole_document(second.len()));
    }

    #[test]
    fn test_append_to_xref_stream_document() {
        let signed = sign(build_xref_stream_pdf(), true, CertificationLevel::NotCertified);
        let doc = PdfDocument::from_bytes(signed).unwrap();
        assert!(doc.uses_xref_stream());
        assert_eq!(doc.signature_names().unwrap().len(), 1);
    }

    #[test]
    fn test_visible_widget_rect() {
        let doc = PdfDocument::from_bytes(sample()).unwrap();
        let mut out = Vec::new();
        let mut signer = PdfSigner::open(doc, &mut out, false).unwrap();
        signer
            .set_field_name("Approval")
            .appearance_mut()
            .set_page_rect([400.0, 700.0, 600.0, 780.0])
            .set_layer2_text("Digitally signed by Test Signer");
        signer
            .sign_detached(DigestOnly, &chain(), 4096, SignatureSubFilter::CadesDetached)
            .unwrap();

        let doc = PdfDocument::from_bytes(out).unwrap();
        let field = doc
            .signature_fields()
            .unwrap()
            .into_iter()
            .find(|f| f.name == "Approval")
            .unwrap();
        let rect: Vec<f64> = field
            .dict
            .get("Rect")
            .and_then(Object::as_array)
            .unwrap()
            .iter()
            .filter_map(Object::as_number)
            .collect();
        assert_eq!(rect, vec![400.0, 700.0, 600.0, 780.0]);
        let page = doc.load_object(doc.page_ref(0).unwrap()).unwrap();
        assert_eq!(page.get("Annots").and_then(Object::as_array).map(Vec::len), Some(1));
        let info = doc.signature("Approval").unwrap().unwrap();
        assert_eq!(info.sub_filter, Some(SignatureSubFilter::CadesDetached));
    }

    #[test]
    fn test_unsigned_field_name_is_not_reused() {
        let source = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R /AcroForm << /Fields [4 0 R] >> >>",
                "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 612 792] >>",
                "<< /Type /Page /Parent 2 0 R >>",
                "<< /T (Signature1) /FT /Sig >>",
            ],
            "",
        );
        let signed = sign(source, true, CertificationLevel::NotCertified);

        let doc = PdfDocument::from_bytes(signed).unwrap();
        assert_eq!(doc.signature_names().unwrap(), vec!["Signature2".to_string()]);
        assert_eq!(doc.field_names().unwrap(), vec!["Signature1", "Signature2"]);
    }

    #[test]
    fn test_page_out_of_range() {
        let doc = PdfDocument::from_bytes(sample()).unwrap();
        let mut signer = PdfSigner::open(doc, Vec::new(), false).unwrap();
        signer.appearance_mut().set_page_number(2);
        let err = signer
            .sign_detached(DigestOnly, &chain(), 0, SignatureSubFilter::Pkcs7Detached)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_reservation_too_small() {
        let doc = PdfDocument::from_bytes(sample()).unwrap();
        let signer = PdfSigner::open(doc, Vec::new(), false).unwrap();
        let err = signer
            .sign_detached(DigestOnly, &chain(), 16, SignatureSubFilter::Pkcs7Detached)
            .unwrap_err();
        assert!(matches!(err, Error::Signing(_)));
    }

    #[test]
    fn test_encrypted_document_rejected() {
        let encrypted = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [] /Count 0 >>",
                "<< /Filter /Standard /V 1 /R 2 >>",
            ],
            "/Encrypt 3 0 R",
        );
        let doc = PdfDocument::from_bytes(encrypted).unwrap();
        assert!(matches!(
            PdfSigner::open(doc, Vec::new(), false),
            Err(Error::Unsupported(_))
        ));
    }
}

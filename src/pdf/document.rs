//! Read access to an existing PDF document.
//!
//! The whole file is held in memory. Objects are parsed on demand through the
//! cross-reference table and cached; object streams are decoded once and
//! cached as a unit.

use super::object::{Dict, Object, ObjectRef};
use super::objstm::parse_object_stream;
use super::parser::parse_indirect_object_at;
use super::xref::{find_xref_offset, parse_xref, CrossRefTable, XRefEntryType, XRefKind};
use crate::error::{Error, Result};
use crate::signatures::SignatureInfo;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Maximum depth of nested reference resolution and tree walks.
const MAX_DEPTH: usize = 64;

/// US Letter, used when a page has no usable `/MediaBox`.
const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

/// A signature field found in the interactive form.
#[derive(Debug, Clone)]
pub struct SignatureField {
    /// Fully qualified field name (partial names joined by `.`)
    pub name: String,
    /// Indirect reference of the field dictionary, if it has one
    pub reference: Option<ObjectRef>,
    /// Field dictionary
    pub dict: Dict,
}

/// An opened PDF document.
pub struct PdfDocument {
    data: Vec<u8>,
    version: (u8, u8),
    xref: CrossRefTable,
    xref_offset: usize,
    trailer: Dict,
    object_cache: RefCell<HashMap<ObjectRef, Object>>,
    object_streams: RefCell<HashMap<u32, HashMap<u32, Object>>>,
    resolving: RefCell<HashSet<ObjectRef>>,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("version", &self.version)
            .field("size", &self.data.len())
            .field("xref_entries", &self.xref.len())
            .field("xref_kind", &self.xref.kind())
            .finish_non_exhaustive()
    }
}

impl PdfDocument {
    /// Open a PDF file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes(data)
    }

    /// Parse a document held in memory.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidHeader` when the data does not start with `%PDF-x.y`
    /// - `Error::InvalidXref` when no cross-reference section can be found
    /// - `Error::InvalidPdf` when the trailer has no `/Root`
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Result<Self> {
        let data = data.into();
        let version = parse_header(&data)?;
        let xref_offset = find_xref_offset(&data)?;
        let xref = parse_xref(&data, xref_offset)?;
        let trailer = xref.trailer().cloned().ok_or(Error::InvalidXref)?;

        if !trailer.contains_key("Root") {
            return Err(Error::InvalidPdf("trailer has no /Root".to_string()));
        }

        log::debug!(
            "Opened PDF {}.{}: {} bytes, {} xref entries ({:?})",
            version.0,
            version.1,
            data.len(),
            xref.len(),
            xref.kind()
        );

        Ok(Self {
            data,
            version,
            xref,
            xref_offset,
            trailer,
            object_cache: RefCell::new(HashMap::new()),
            object_streams: RefCell::new(HashMap::new()),
            resolving: RefCell::new(HashSet::new()),
        })
    }

    /// Raw bytes of the file.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// PDF version from the header, as (major, minor).
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Trailer dictionary of the newest revision.
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// Merged cross-reference table.
    pub fn xref(&self) -> &CrossRefTable {
        &self.xref
    }

    /// Offset of the newest cross-reference section.
    pub fn xref_offset(&self) -> usize {
        self.xref_offset
    }

    /// Whether the newest revision uses a cross-reference stream.
    pub fn uses_xref_stream(&self) -> bool {
        self.xref.kind() == XRefKind::Stream
    }

    /// Whether the trailer declares an `/Encrypt` dictionary.
    pub fn is_encrypted(&self) -> bool {
        self.trailer.contains_key("Encrypt")
    }

    /// Highest object number in use or reserved by `/Size`.
    pub fn max_object_number(&self) -> u32 {
        let from_size = self
            .trailer
            .get("Size")
            .and_then(Object::as_integer)
            .and_then(|size| u32::try_from(size - 1).ok())
            .unwrap_or(0);
        let from_xref = self.xref.object_numbers().last().copied().unwrap_or(0);
        from_size.max(from_xref)
    }

    /// Load an indirect object.
    ///
    /// # Errors
    ///
    /// `Error::ObjectNotFound` when the object has no live cross-reference
    /// entry, `Error::CircularReference` when loading it requires itself.
    pub fn load_object(&self, obj_ref: ObjectRef) -> Result<Object> {
        if let Some(cached) = self.object_cache.borrow().get(&obj_ref) {
            return Ok(cached.clone());
        }
        if !self.resolving.borrow_mut().insert(obj_ref) {
            return Err(Error::CircularReference(obj_ref));
        }
        let result = self.load_uncached(obj_ref);
        self.resolving.borrow_mut().remove(&obj_ref);

        let object = result?;
        self.object_cache.borrow_mut().insert(obj_ref, object.clone());
        Ok(object)
    }

    fn load_uncached(&self, obj_ref: ObjectRef) -> Result<Object> {
        let entry = self
            .xref
            .get(obj_ref.id)
            .copied()
            .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))?;

        match entry.entry_type {
            XRefEntryType::Free => Err(Error::ObjectNotFound(obj_ref.id, obj_ref.gen)),
            XRefEntryType::Uncompressed => {
                let offset = usize::try_from(entry.offset).map_err(|_| Error::InvalidXref)?;
                let (found, object) = parse_indirect_object_at(&self.data, offset)?;
                if found.id != obj_ref.id {
                    return Err(Error::InvalidPdf(format!(
                        "xref points object {} at offset {}, found object {}",
                        obj_ref.id, offset, found.id
                    )));
                }
                Ok(object)
            },
            XRefEntryType::Compressed => {
                let stream_num = u32::try_from(entry.offset).map_err(|_| Error::InvalidXref)?;
                self.load_from_object_stream(stream_num, obj_ref)
            },
        }
    }

    fn load_from_object_stream(&self, stream_num: u32, obj_ref: ObjectRef) -> Result<Object> {
        if !self.object_streams.borrow().contains_key(&stream_num) {
            let stream = self.load_object(ObjectRef::new(stream_num, 0))?;
            let objects = parse_object_stream(&stream)?;
            self.object_streams.borrow_mut().insert(stream_num, objects);
        }
        self.object_streams
            .borrow()
            .get(&stream_num)
            .and_then(|objects| objects.get(&obj_ref.id))
            .cloned()
            .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))
    }

    /// Follow references until a direct object is reached.
    pub fn resolve(&self, obj: &Object) -> Result<Object> {
        let mut current = obj.clone();
        for _ in 0..MAX_DEPTH {
            match current {
                Object::Reference(r) => current = self.load_object(r)?,
                direct => return Ok(direct),
            }
        }
        Err(Error::InvalidPdf("reference chain too long".to_string()))
    }

    /// Resolve an object that must be a dictionary (or a stream's dictionary).
    pub fn resolve_dict(&self, obj: &Object) -> Result<Dict> {
        match self.resolve(obj)? {
            Object::Dictionary(dict) | Object::Stream { dict, .. } => Ok(dict),
            other => Err(Error::InvalidObjectType {
                expected: "Dictionary".to_string(),
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Reference to the document catalog.
    pub fn catalog_ref(&self) -> Result<ObjectRef> {
        self.trailer
            .get("Root")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("/Root is not an indirect reference".to_string()))
    }

    /// The document catalog.
    pub fn catalog(&self) -> Result<Dict> {
        let catalog = self.resolve_dict(&Object::Reference(self.catalog_ref()?))?;
        match catalog.get("Type").and_then(Object::as_name) {
            Some("Catalog") | None => Ok(catalog),
            Some(other) => Err(Error::InvalidPdf(format!("/Root has /Type /{}", other))),
        }
    }

    /// Page references in document order.
    pub fn page_refs(&self) -> Result<Vec<ObjectRef>> {
        let catalog = self.catalog()?;
        let root = catalog
            .get("Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("catalog has no /Pages reference".to_string()))?;

        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        self.collect_pages(root, &mut pages, &mut visited, 0)?;
        Ok(pages)
    }

    fn collect_pages(
        &self,
        node_ref: ObjectRef,
        pages: &mut Vec<ObjectRef>,
        visited: &mut HashSet<ObjectRef>,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_DEPTH || !visited.insert(node_ref) {
            return Err(Error::CircularReference(node_ref));
        }
        let node = self.resolve_dict(&Object::Reference(node_ref))?;
        let is_leaf = match node.get("Type").and_then(Object::as_name) {
            Some("Page") => true,
            Some("Pages") => false,
            _ => !node.contains_key("Kids"),
        };
        if is_leaf {
            pages.push(node_ref);
            return Ok(());
        }

        let kids = match node.get("Kids") {
            Some(kids) => self.resolve(kids)?,
            None => Object::Array(Vec::new()),
        };
        for kid in kids.as_array().map(Vec::as_slice).unwrap_or_default() {
            match kid.as_reference() {
                Some(kid_ref) => self.collect_pages(kid_ref, pages, visited, depth + 1)?,
                None => log::warn!("Ignoring direct page tree node in /Kids of {}", node_ref),
            }
        }
        Ok(())
    }

    /// Number of pages.
    pub fn page_count(&self) -> Result<usize> {
        Ok(self.page_refs()?.len())
    }

    /// Reference to the page at a 0-based index.
    pub fn page_ref(&self, index: usize) -> Result<ObjectRef> {
        let pages = self.page_refs()?;
        pages.get(index).copied().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "page index {} out of range, document has {} pages",
                index,
                pages.len()
            ))
        })
    }

    /// Look up a page attribute, walking `/Parent` links for inherited
    /// values (`/MediaBox`, `/Resources`, `/Rotate`, ...).
    pub fn inherited_attribute(&self, page: ObjectRef, key: &str) -> Result<Option<Object>> {
        let mut node = self.resolve_dict(&Object::Reference(page))?;
        for _ in 0..MAX_DEPTH {
            if let Some(value) = node.get(key) {
                return self.resolve(value).map(Some);
            }
            match node.get("Parent") {
                Some(parent) => node = self.resolve_dict(parent)?,
                None => return Ok(None),
            }
        }
        Err(Error::CircularReference(page))
    }

    /// Width and height in points of the page at a 0-based index, from its
    /// (possibly inherited) `/MediaBox`.
    pub fn page_size(&self, index: usize) -> Result<(f32, f32)> {
        let page = self.page_ref(index)?;
        let media_box = self.inherited_attribute(page, "MediaBox")?;
        let numbers: Option<Vec<f64>> = media_box
            .as_ref()
            .and_then(Object::as_array)
            .map(|items| items.iter().filter_map(Object::as_number).collect());

        match numbers.as_deref() {
            Some([llx, lly, urx, ury]) => {
                Ok(((urx - llx).abs() as f32, (ury - lly).abs() as f32))
            },
            _ => {
                log::warn!("Page {} has no usable /MediaBox, assuming US Letter", index);
                Ok(DEFAULT_PAGE_SIZE)
            },
        }
    }

    /// The interactive form dictionary, if the catalog has one.
    pub fn acroform(&self) -> Result<Option<Dict>> {
        match self.catalog()?.get("AcroForm") {
            Some(form) => self.resolve_dict(form).map(Some),
            None => Ok(None),
        }
    }

    /// Every signed signature field: fields whose (inherited) `/FT` is `/Sig`
    /// and whose `/V` holds a value.
    pub fn signature_fields(&self) -> Result<Vec<SignatureField>> {
        Ok(self
            .form_fields()?
            .into_iter()
            .filter(|(_, signed)| *signed)
            .map(|(field, _)| field)
            .collect())
    }

    /// Fully qualified names of every form field, of any type and whether
    /// filled or not.
    pub fn field_names(&self) -> Result<Vec<String>> {
        Ok(self
            .form_fields()?
            .into_iter()
            .map(|(field, _)| field.name)
            .filter(|name| !name.is_empty())
            .collect())
    }

    /// Every field of the form, flagged when it is a signed signature.
    fn form_fields(&self) -> Result<Vec<(SignatureField, bool)>> {
        let Some(form) = self.acroform()? else {
            return Ok(Vec::new());
        };
        let fields = match form.get("Fields") {
            Some(fields) => self.resolve(fields)?,
            None => return Ok(Vec::new()),
        };

        let mut found = Vec::new();
        let mut visited = HashSet::new();
        for field in fields.as_array().map(Vec::as_slice).unwrap_or_default() {
            self.walk_field(field, None, None, &mut visited, &mut found, 0)?;
        }
        Ok(found)
    }

    fn walk_field(
        &self,
        field: &Object,
        parent_name: Option<&str>,
        parent_type: Option<&str>,
        visited: &mut HashSet<ObjectRef>,
        found: &mut Vec<(SignatureField, bool)>,
        depth: usize,
    ) -> Result<()> {
        let reference = field.as_reference();
        if let Some(r) = reference {
            if depth > MAX_DEPTH || !visited.insert(r) {
                return Err(Error::CircularReference(r));
            }
        }
        let dict = self.resolve_dict(field)?;

        let name = match (parent_name, dict.get("T").and_then(Object::as_text)) {
            (Some(parent), Some(partial)) => format!("{}.{}", parent, partial),
            (None, Some(partial)) => partial,
            (Some(parent), None) => parent.to_string(),
            (None, None) => String::new(),
        };
        let field_type = dict
            .get("FT")
            .and_then(Object::as_name)
            .map(str::to_string)
            .or_else(|| parent_type.map(str::to_string));

        let has_value = match dict.get("V") {
            Some(value) => !self.resolve(value)?.is_null(),
            None => false,
        };
        let signed = field_type.as_deref() == Some("Sig") && has_value;
        found.push((
            SignatureField {
                name: name.clone(),
                reference,
                dict: dict.clone(),
            },
            signed,
        ));

        if let Some(kids) = dict.get("Kids") {
            let kids = self.resolve(kids)?;
            for kid in kids.as_array().map(Vec::as_slice).unwrap_or_default() {
                // Kids without /T are widget annotations of this field.
                let kid_dict = self.resolve_dict(kid)?;
                if kid_dict.contains_key("T") {
                    self.walk_field(kid, Some(&name), field_type.as_deref(), visited, found, depth + 1)?;
                }
            }
        }
        Ok(())
    }

    /// Fully qualified names of the signed signature fields, in form order.
    pub fn signature_names(&self) -> Result<Vec<String>> {
        Ok(self.signature_fields()?.into_iter().map(|f| f.name).collect())
    }

    /// Details of the signature held by the named field.
    pub fn signature(&self, name: &str) -> Result<Option<SignatureInfo>> {
        let Some(field) = self.signature_fields()?.into_iter().find(|f| f.name == name) else {
            return Ok(None);
        };
        let value = field
            .dict
            .get("V")
            .ok_or_else(|| Error::InvalidPdf(format!("signature field {} lost its /V", name)))?;
        let sig = self.resolve_dict(value)?;
        Ok(Some(SignatureInfo::from_dict(name, &sig)))
    }

    /// Every live object except object streams and cross-reference streams,
    /// in object number order.
    pub fn live_objects(&self) -> Result<Vec<(ObjectRef, Object)>> {
        let mut objects = Vec::new();
        for id in self.xref.object_numbers() {
            let Some(entry) = self.xref.get(id).copied() else {
                continue;
            };
            let gen = match entry.entry_type {
                XRefEntryType::Free => continue,
                XRefEntryType::Uncompressed => entry.generation,
                XRefEntryType::Compressed => 0,
            };
            let obj_ref = ObjectRef::new(id, gen);
            let object = self.load_object(obj_ref)?;
            if matches!(object.get("Type").and_then(Object::as_name), Some("ObjStm" | "XRef")) {
                continue;
            }
            objects.push((obj_ref, object));
        }
        Ok(objects)
    }
}

/// Parse `%PDF-M.m` at the start of the file.
///
/// ```
/// # use pdf_signet::pdf::document::parse_header;
/// assert_eq!(parse_header(b"%PDF-1.7\n").unwrap(), (1, 7));
/// assert!(parse_header(b"GIF89a").is_err());
/// ```
pub fn parse_header(data: &[u8]) -> Result<(u8, u8)> {
    let head = &data[..data.len().min(8)];
    if head.len() < 8 || &head[..5] != b"%PDF-" || head[6] != b'.' {
        return Err(Error::InvalidHeader(String::from_utf8_lossy(head).into_owned()));
    }
    let (major, minor) = (head[5], head[7]);
    if !major.is_ascii_digit() || !minor.is_ascii_digit() {
        return Err(Error::InvalidHeader(String::from_utf8_lossy(head).into_owned()));
    }
    Ok((major - b'0', minor - b'0'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::testing::{build_pdf, build_xref_stream_pdf};

    fn two_page_pdf() -> Vec<u8> {
        build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 /MediaBox [0 0 612 792] >>",
                "<< /Type /Page /Parent 2 0 R >>",
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 842 595] >>",
            ],
            "",
        )
    }

    #[test]
    fn test_header() {
        assert_eq!(parse_header(b"%PDF-1.4\n").unwrap(), (1, 4));
        assert!(matches!(parse_header(b"%PDF"), Err(Error::InvalidHeader(_))));
        assert!(matches!(parse_header(b"%PDF-x.y\n"), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn test_pages_and_sizes() {
        let doc = PdfDocument::from_bytes(two_page_pdf()).unwrap();
        assert_eq!(doc.version(), (1, 4));
        assert_eq!(doc.page_count().unwrap(), 2);
        assert_eq!(doc.page_ref(1).unwrap(), ObjectRef::new(4, 0));
        assert_eq!(doc.page_size(0).unwrap(), (612.0, 792.0));
        assert_eq!(doc.page_size(1).unwrap(), (842.0, 595.0));
        assert!(matches!(doc.page_ref(2), Err(Error::InvalidArgument(_))));
        assert!(!doc.uses_xref_stream());
        assert_eq!(doc.max_object_number(), 4);
    }

    #[test]
    fn test_missing_media_box_defaults_to_letter() {
        let data = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
                "<< /Type /Page /Parent 2 0 R >>",
            ],
            "",
        );
        let doc = PdfDocument::from_bytes(data).unwrap();
        assert_eq!(doc.page_size(0).unwrap(), (612.0, 792.0));
    }

    #[test]
    fn test_page_tree_cycle_is_detected() {
        let data = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [2 0 R] /Count 1 >>",
            ],
            "",
        );
        let doc = PdfDocument::from_bytes(data).unwrap();
        assert!(matches!(doc.page_count(), Err(Error::CircularReference(_))));
    }

    #[test]
    fn test_missing_object() {
        let doc = PdfDocument::from_bytes(two_page_pdf()).unwrap();
        assert!(matches!(
            doc.load_object(ObjectRef::new(40, 0)),
            Err(Error::ObjectNotFound(40, 0))
        ));
        assert!(matches!(
            doc.load_object(ObjectRef::new(0, 65535)),
            Err(Error::ObjectNotFound(0, 65535))
        ));
    }

    #[test]
    fn test_no_signatures_without_acroform() {
        let doc = PdfDocument::from_bytes(two_page_pdf()).unwrap();
        assert!(doc.acroform().unwrap().is_none());
        assert!(doc.signature_names().unwrap().is_empty());
    }

    #[test]
    fn test_signature_names_walk_kids() {
        let data = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R /AcroForm << /Fields [4 0 R 6 0 R] /SigFlags 3 >> >>",
                "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
                "<< /Type /Page /Parent 2 0 R >>",
                "<< /T (approvals) /FT /Sig /Kids [5 0 R 7 0 R] >>",
                "<< /T (manager) /Parent 4 0 R /V 8 0 R >>",
                "<< /T (text) /FT /Tx /V (hello) >>",
                "<< /T (unsigned) /Parent 4 0 R >>",
                "<< /Type /Sig /Filter /Adobe.PPKLite /SubFilter /adbe.pkcs7.detached /Reason (ok) /M (D:20240102030405+01'00') /ByteRange [0 10 20 30] /Contents <00> >>",
            ],
            "",
        );
        let doc = PdfDocument::from_bytes(data).unwrap();
        assert_eq!(doc.signature_names().unwrap(), vec!["approvals.manager".to_string()]);

        let info = doc.signature("approvals.manager").unwrap().unwrap();
        assert_eq!(info.reason.as_deref(), Some("ok"));
        assert_eq!(info.byte_range, vec![0, 10, 20, 30]);
        assert!(doc.signature("approvals.unsigned").unwrap().is_none());
        assert_eq!(
            doc.field_names().unwrap(),
            vec!["approvals", "approvals.manager", "approvals.unsigned", "text"]
        );
    }

    #[test]
    fn test_encrypted_flag() {
        let data = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [] /Count 0 >>",
                "<< /Filter /Standard /V 2 >>",
            ],
            "/Encrypt 3 0 R",
        );
        let doc = PdfDocument::from_bytes(data).unwrap();
        assert!(doc.is_encrypted());
        assert_eq!(doc.page_count().unwrap(), 0);
    }

    #[test]
    fn test_trailer_without_root() {
        let mut data = b"%PDF-1.4\n".to_vec();
        let xref = data.len();
        data.extend_from_slice(
            format!("xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 >>\nstartxref\n{}\n%%EOF\n", xref)
                .as_bytes(),
        );
        assert!(matches!(PdfDocument::from_bytes(data), Err(Error::InvalidPdf(_))));
    }

    #[test]
    fn test_live_objects_in_order() {
        let doc = PdfDocument::from_bytes(two_page_pdf()).unwrap();
        let ids: Vec<u32> = doc.live_objects().unwrap().iter().map(|(r, _)| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_objects_from_object_stream() {
        let doc = PdfDocument::from_bytes(build_xref_stream_pdf()).unwrap();
        assert!(doc.uses_xref_stream());
        assert_eq!(doc.version(), (1, 5));
        assert_eq!(doc.page_count().unwrap(), 1);
        assert_eq!(doc.page_size(0).unwrap(), (595.0, 842.0));
        assert_eq!(doc.max_object_number(), 5);

        let ids: Vec<u32> = doc.live_objects().unwrap().iter().map(|(r, _)| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}

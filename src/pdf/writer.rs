//! Writing a modified document back out.
//!
//! Two modes are supported:
//! - [`IncrementalWriter`] appends the changed objects, a new cross-reference
//!   section and a trailer linked to the previous one through `/Prev`. The
//!   original bytes are left untouched, so earlier signatures stay valid.
//! - [`FullRewriteWriter`] re-serializes every live object into a fresh file
//!   with a single classic cross-reference table.
//!
//! Both return the offset of every object they wrote so that callers can
//! patch placeholder values in place afterwards.

use super::document::PdfDocument;
use super::object::{Dict, Object, ObjectRef};
use super::serializer::ObjectSerializer;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::io::Write;

/// Binary comment written after the header so transfer tools treat the file
/// as binary.
const BINARY_MARKER: &[u8] = b"%\xE2\xE3\xCF\xD3\n";

/// Trailer keys carried over from the source document.
const CARRIED_TRAILER_KEYS: [&str; 3] = ["Root", "Info", "ID"];

/// A set of new and replaced objects to be written on top of a document.
#[derive(Debug, Clone)]
pub struct DocumentUpdate {
    next_id: u32,
    objects: BTreeMap<ObjectRef, Object>,
}

impl DocumentUpdate {
    /// Start an update for `doc`. New object numbers are allocated above
    /// every number the document already uses.
    pub fn new(doc: &PdfDocument) -> Self {
        Self {
            next_id: doc.max_object_number() + 1,
            objects: BTreeMap::new(),
        }
    }

    /// Reserve a fresh object number.
    pub fn allocate(&mut self) -> ObjectRef {
        let obj_ref = ObjectRef::new(self.next_id, 0);
        self.next_id += 1;
        obj_ref
    }

    /// Add a new object or replace an existing one.
    pub fn set(&mut self, obj_ref: ObjectRef, object: Object) {
        if obj_ref.id >= self.next_id {
            self.next_id = obj_ref.id + 1;
        }
        self.objects.insert(obj_ref, object);
    }

    /// Reserve a number for `object` and add it.
    pub fn add(&mut self, object: Object) -> ObjectRef {
        let obj_ref = self.allocate();
        self.objects.insert(obj_ref, object);
        obj_ref
    }

    pub fn get(&self, obj_ref: ObjectRef) -> Option<&Object> {
        self.objects.get(&obj_ref)
    }

    pub fn contains(&self, obj_ref: ObjectRef) -> bool {
        self.objects.contains_key(&obj_ref)
    }

    /// Changed objects in object number order.
    pub fn objects(&self) -> impl Iterator<Item = (&ObjectRef, &Object)> {
        self.objects.iter()
    }

    /// The `/Size` value of a trailer covering this update.
    pub fn size(&self) -> u32 {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Output of a writer.
#[derive(Debug, Clone)]
pub struct WrittenDocument {
    /// The complete file
    pub bytes: Vec<u8>,
    /// Byte offset of each object header (`N G obj`) written by this pass
    pub offsets: BTreeMap<ObjectRef, usize>,
    /// Byte offset just past the `endobj` keyword of each written object
    pub ends: BTreeMap<ObjectRef, usize>,
}

impl WrittenDocument {
    /// Serialized bytes of one written object, from its header up to and
    /// including `endobj`.
    pub fn object_bytes(&self, obj_ref: ObjectRef) -> Option<(usize, &[u8])> {
        let start = *self.offsets.get(&obj_ref)?;
        let end = *self.ends.get(&obj_ref)?;
        self.bytes.get(start..end).map(|bytes| (start, bytes))
    }
}

/// Appends an update section to the original file.
pub struct IncrementalWriter<'a> {
    doc: &'a PdfDocument,
    serializer: ObjectSerializer,
}

impl<'a> IncrementalWriter<'a> {
    pub fn new(doc: &'a PdfDocument) -> Self {
        Self {
            doc,
            serializer: ObjectSerializer::compact(),
        }
    }

    /// Write the original bytes followed by `update`.
    ///
    /// The new section uses a cross-reference stream when the source does,
    /// and a classic table otherwise.
    pub fn write(&self, update: &DocumentUpdate) -> Result<WrittenDocument> {
        let mut out = self.doc.data().to_vec();
        if !matches!(out.last(), Some(b'\n' | b'\r')) {
            out.push(b'\n');
        }

        let mut offsets = BTreeMap::new();
        let mut ends = BTreeMap::new();
        for (obj_ref, object) in update.objects() {
            offsets.insert(*obj_ref, out.len());
            out.extend_from_slice(&self.serializer.serialize_indirect(*obj_ref, object));
            ends.insert(*obj_ref, end_of_object(&out));
        }

        let mut trailer = carried_trailer(self.doc.trailer());
        trailer.insert("Prev".to_string(), Object::Integer(self.doc.xref_offset() as i64));

        let xref_offset = out.len();
        if self.doc.uses_xref_stream() {
            let xref_ref = ObjectRef::new(update.size(), 0);
            let mut entries: Vec<(u32, usize, u16)> = offsets.iter().map(|(r, &o)| (r.id, o, r.gen)).collect();
            entries.push((xref_ref.id, xref_offset, 0));
            trailer.insert("Size".to_string(), Object::Integer(xref_ref.id as i64 + 1));
            let stream = build_xref_stream(&entries, trailer)?;
            out.extend_from_slice(&self.serializer.serialize_indirect(xref_ref, &stream));
        } else {
            let entries: Vec<(u32, usize, u16)> = offsets.iter().map(|(r, &o)| (r.id, o, r.gen)).collect();
            trailer.insert("Size".to_string(), Object::Integer(update.size() as i64));
            write_xref_table(&mut out, &entries)?;
            write!(out, "trailer\n")?;
            out.extend_from_slice(&self.serializer.serialize(&Object::Dictionary(trailer)));
            out.push(b'\n');
        }
        write!(out, "startxref\n{}\n%%EOF\n", xref_offset)?;

        log::debug!(
            "Incremental update: {} objects appended, xref at {}",
            offsets.len(),
            xref_offset
        );
        Ok(WrittenDocument { bytes: out, offsets, ends })
    }
}

/// Rewrites the whole document.
pub struct FullRewriteWriter<'a> {
    doc: &'a PdfDocument,
    serializer: ObjectSerializer,
}

impl<'a> FullRewriteWriter<'a> {
    pub fn new(doc: &'a PdfDocument) -> Self {
        Self {
            doc,
            serializer: ObjectSerializer::compact(),
        }
    }

    /// Serialize every live object of the source, with `update` applied, into
    /// a new file. Objects from object streams are written as plain objects,
    /// and the object and cross-reference streams themselves are dropped.
    pub fn write(&self, update: &DocumentUpdate) -> Result<WrittenDocument> {
        let mut objects: BTreeMap<u32, (ObjectRef, Object)> = self
            .doc
            .live_objects()?
            .into_iter()
            .map(|(r, o)| (r.id, (r, o)))
            .collect();
        for (obj_ref, object) in update.objects() {
            objects.insert(obj_ref.id, (*obj_ref, object.clone()));
        }

        let (major, minor) = self.doc.version();
        let mut out = format!("%PDF-{}.{}\n", major, minor).into_bytes();
        out.extend_from_slice(BINARY_MARKER);

        let mut offsets = BTreeMap::new();
        let mut ends = BTreeMap::new();
        for (obj_ref, object) in objects.values() {
            offsets.insert(*obj_ref, out.len());
            out.extend_from_slice(&self.serializer.serialize_indirect(*obj_ref, object));
            ends.insert(*obj_ref, end_of_object(&out));
        }

        let size = objects
            .keys()
            .next_back()
            .map_or(1, |&id| id + 1)
            .max(update.size());
        let entries: Vec<(u32, usize, u16)> = offsets.iter().map(|(r, &o)| (r.id, o, r.gen)).collect();

        let xref_offset = out.len();
        write!(out, "xref\n0 {}\n", size)?;
        let by_id: BTreeMap<u32, (usize, u16)> = entries.iter().map(|&(id, o, g)| (id, (o, g))).collect();
        for id in 0..size {
            match by_id.get(&id) {
                Some(&(offset, gen)) => write!(out, "{:010} {:05} n \n", offset, gen)?,
                None => write!(out, "0000000000 65535 f \n")?,
            }
        }

        let mut trailer = carried_trailer(self.doc.trailer());
        trailer.insert("Size".to_string(), Object::Integer(size as i64));
        write!(out, "trailer\n")?;
        out.extend_from_slice(&self.serializer.serialize(&Object::Dictionary(trailer)));
        write!(out, "\nstartxref\n{}\n%%EOF\n", xref_offset)?;

        log::debug!("Full rewrite: {} objects, {} bytes", offsets.len(), out.len());
        Ok(WrittenDocument { bytes: out, offsets, ends })
    }
}

/// Offset just past `endobj` for an object that was just appended to `out`,
/// ignoring the line break the serializer writes after the keyword.
fn end_of_object(out: &[u8]) -> usize {
    out.len() - out.iter().rev().take_while(|b| b.is_ascii_whitespace()).count()
}

fn carried_trailer(source: &Dict) -> Dict {
    CARRIED_TRAILER_KEYS
        .iter()
        .filter_map(|&key| source.get(key).map(|v| (key.to_string(), v.clone())))
        .collect()
}

/// Group sorted object numbers into `(first, count)` subsections.
fn subsections(ids: &[u32]) -> Vec<(u32, u32)> {
    let mut sections: Vec<(u32, u32)> = Vec::new();
    for &id in ids {
        match sections.last_mut() {
            Some((first, count)) if *first + *count == id => *count += 1,
            _ => sections.push((id, 1)),
        }
    }
    sections
}

/// Classic table for the given `(id, offset, gen)` entries.
fn write_xref_table(out: &mut Vec<u8>, entries: &[(u32, usize, u16)]) -> Result<()> {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|&(id, _, _)| id);
    let ids: Vec<u32> = sorted.iter().map(|&(id, _, _)| id).collect();

    write!(out, "xref\n")?;
    let mut rows = sorted.iter();
    for (first, count) in subsections(&ids) {
        write!(out, "{} {}\n", first, count)?;
        for &(_, offset, gen) in rows.by_ref().take(count as usize) {
            write!(out, "{:010} {:05} n \n", offset, gen)?;
        }
    }
    Ok(())
}

/// Uncompressed cross-reference stream with `/W [1 4 2]`.
fn build_xref_stream(entries: &[(u32, usize, u16)], mut dict: Dict) -> Result<Object> {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|&(id, _, _)| id);
    let ids: Vec<u32> = sorted.iter().map(|&(id, _, _)| id).collect();

    let mut data = Vec::with_capacity(sorted.len() * 7);
    for &(_, offset, gen) in &sorted {
        let offset = u32::try_from(offset).map_err(|_| {
            Error::Unsupported(format!("offset {} does not fit a 4-byte xref stream field", offset))
        })?;
        data.push(1u8);
        data.extend_from_slice(&offset.to_be_bytes());
        data.extend_from_slice(&gen.to_be_bytes());
    }

    let index = subsections(&ids)
        .into_iter()
        .flat_map(|(first, count)| [Object::Integer(first as i64), Object::Integer(count as i64)])
        .collect();
    dict.insert("Type".to_string(), Object::name("XRef"));
    dict.insert(
        "W".to_string(),
        Object::Array(vec![Object::Integer(1), Object::Integer(4), Object::Integer(2)]),
    );
    dict.insert("Index".to_string(), Object::Array(index));

    Ok(Object::Stream {
        dict,
        data: bytes::Bytes::from(data),
    })
}

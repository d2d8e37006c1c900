//! Cross-reference table parser.
//!
//! The xref table maps object numbers to byte offsets in the file, or to a
//! slot in an object stream. Both classic tables (PDF 1.0-1.4) and
//! cross-reference streams (PDF 1.5+) are read, along with hybrid files whose
//! classic trailer points at an extra stream through `/XRefStm`. Sections
//! linked by `/Prev` are merged so the newest entry for each object wins.

use super::filters::decode_stream;
use super::lexer::{token, Token};
use super::object::{Dict, Object};
use super::parser::{parse_indirect_object, parse_object};
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};

/// Cross-reference table entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntryType {
    /// Entry for a free object
    Free,
    /// Entry for an object stored directly in the file
    Uncompressed,
    /// Entry for an object in an object stream (PDF 1.5+)
    Compressed,
}

/// Cross-reference table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XRefEntry {
    /// Type of entry
    pub entry_type: XRefEntryType,
    /// Byte offset (uncompressed), object stream number (compressed) or
    /// next free object (free)
    pub offset: u64,
    /// Generation number, or index within the object stream
    pub generation: u16,
}

impl XRefEntry {
    /// Object stored at a byte offset.
    pub fn uncompressed(offset: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Uncompressed,
            offset,
            generation,
        }
    }

    /// Object stored in an object stream.
    pub fn compressed(stream_obj_num: u64, index_in_stream: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Compressed,
            offset: stream_obj_num,
            generation: index_in_stream,
        }
    }

    /// Free entry.
    pub fn free(next_free: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Free,
            offset: next_free,
            generation,
        }
    }

    /// Whether the entry describes a live object.
    pub fn in_use(&self) -> bool {
        self.entry_type != XRefEntryType::Free
    }
}

/// Form of the newest cross-reference section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XRefKind {
    /// `xref` keyword, fixed-width rows and a `trailer` dictionary
    #[default]
    Table,
    /// `/Type /XRef` stream
    Stream,
}

/// Cross-reference table that maps object numbers to their locations.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: HashMap<u32, XRefEntry>,
    trailer: Option<Dict>,
    kind: XRefKind,
}

impl CrossRefTable {
    /// Create a new empty cross-reference table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the trailer dictionary.
    pub fn set_trailer(&mut self, trailer: Dict) {
        self.trailer = Some(trailer);
    }

    /// Trailer dictionary of the newest section. For xref streams this is
    /// the stream dictionary.
    pub fn trailer(&self) -> Option<&Dict> {
        self.trailer.as_ref()
    }

    /// Form of the newest section.
    pub fn kind(&self) -> XRefKind {
        self.kind
    }

    /// Add an entry, replacing any previous entry for the object.
    pub fn add_entry(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// Get an entry by object number.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// Check if an object exists in the table.
    pub fn contains(&self, object_number: u32) -> bool {
        self.entries.contains_key(&object_number)
    }

    /// All object numbers in the table, in ascending order.
    pub fn object_numbers(&self) -> Vec<u32> {
        let mut numbers: Vec<u32> = self.entries.keys().copied().collect();
        numbers.sort_unstable();
        numbers
    }

    /// Merge an older section into this one. Entries already present win,
    /// and so does this section's trailer.
    pub fn merge_from(&mut self, older: CrossRefTable) {
        for (obj_num, entry) in older.entries {
            self.entries.entry(obj_num).or_insert(entry);
        }
        if self.trailer.is_none() {
            self.trailer = older.trailer;
        }
    }

    /// Number of entries in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the byte offset of the newest cross-reference section from the
/// `startxref` keyword near the end of the file.
///
/// # Errors
///
/// `Error::InvalidXref` if the keyword or its offset is missing.
pub fn find_xref_offset(data: &[u8]) -> Result<usize> {
    let keyword = b"startxref";
    let pos = data
        .windows(keyword.len())
        .rposition(|window| window == keyword)
        .ok_or(Error::InvalidXref)?;

    match token(&data[pos + keyword.len()..]) {
        Ok((_, Token::Integer(offset))) if offset >= 0 => {
            let offset = offset as usize;
            if offset >= data.len() {
                log::warn!("startxref offset {} lies beyond end of file", offset);
                return Err(Error::InvalidXref);
            }
            Ok(offset)
        },
        _ => Err(Error::InvalidXref),
    }
}

/// Parse the cross-reference section at `offset` and every older section
/// reachable from it through `/Prev` and `/XRefStm`.
pub fn parse_xref(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    let mut visited = HashSet::new();
    let mut merged = parse_section(data, offset)?;
    visited.insert(offset);

    let mut hybrid = xref_stm_offset(&merged);
    let mut prev = prev_offset(&merged);

    loop {
        if let Some(stm_offset) = hybrid.take() {
            if visited.insert(stm_offset) {
                log::debug!("Merging hybrid /XRefStm at offset {}", stm_offset);
                let stream_section = parse_xref_stream(data, stm_offset)?;
                merged.merge_from(without_trailer(stream_section));
            }
        }

        let Some(prev_off) = prev.take() else {
            break;
        };
        if !visited.insert(prev_off) {
            log::warn!("Cyclic /Prev chain at offset {}, stopping", prev_off);
            break;
        }
        if visited.len() > 100 {
            return Err(Error::InvalidPdf("xref /Prev chain depth exceeded 100".to_string()));
        }

        log::debug!("Following /Prev to offset {}", prev_off);
        let older = parse_section(data, prev_off)?;
        hybrid = xref_stm_offset(&older);
        prev = prev_offset(&older);
        merged.merge_from(older);
    }

    log::debug!("Cross-reference table has {} entries", merged.len());
    Ok(merged)
}

fn without_trailer(mut table: CrossRefTable) -> CrossRefTable {
    table.trailer = None;
    table
}

fn offset_entry(table: &CrossRefTable, key: &str) -> Option<usize> {
    table
        .trailer()
        .and_then(|t| t.get(key))
        .and_then(Object::as_integer)
        .and_then(|v| usize::try_from(v).ok())
}

fn prev_offset(table: &CrossRefTable) -> Option<usize> {
    offset_entry(table, "Prev")
}

fn xref_stm_offset(table: &CrossRefTable) -> Option<usize> {
    match table.kind {
        XRefKind::Table => offset_entry(table, "XRefStm"),
        XRefKind::Stream => None,
    }
}

fn parse_section(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    let section = data.get(offset..).ok_or(Error::InvalidXref)?;
    match token(section) {
        Ok((_, Token::Keyword(b"xref"))) => parse_traditional_xref(data, offset),
        Ok((_, Token::Integer(_))) => parse_xref_stream(data, offset),
        _ => {
            log::warn!("No cross-reference section at offset {}", offset);
            Err(Error::InvalidXref)
        },
    }
}

/// Parse a classic table:
///
/// ```text
/// xref
/// 0 6
/// 0000000000 65535 f
/// 0000000018 00000 n
/// ...
/// trailer
/// << /Size 6 /Root 1 0 R >>
/// ```
fn parse_traditional_xref(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    let invalid = |reason: &str| Error::ParseError {
        offset,
        reason: format!("xref table: {}", reason),
    };

    let section = data.get(offset..).ok_or(Error::InvalidXref)?;
    let (mut input, _) = token(section).map_err(|_| Error::InvalidXref)?;
    let mut table = CrossRefTable::new();

    loop {
        match token(input) {
            Ok((rest, Token::Keyword(b"trailer"))) => {
                let (_, trailer) = parse_object(rest).map_err(|_| invalid("unreadable trailer"))?;
                match trailer {
                    Object::Dictionary(dict) => table.set_trailer(dict),
                    other => return Err(invalid(&format!("trailer is a {}", other.type_name()))),
                }
                return Ok(table);
            },
            Ok((rest, Token::Integer(start))) => {
                let (rest, count) = match token(rest) {
                    Ok((rest, Token::Integer(count))) => (rest, count),
                    _ => return Err(invalid("subsection header without count")),
                };
                let start = u32::try_from(start).map_err(|_| invalid("negative subsection start"))?;
                let count = u32::try_from(count).map_err(|_| invalid("negative subsection count"))?;
                input = parse_subsection(rest, start, count, &mut table).ok_or_else(|| {
                    invalid(&format!("malformed rows in subsection {} {}", start, count))
                })?;
            },
            _ => return Err(invalid("expected subsection or trailer")),
        }
    }
}

fn parse_subsection<'a>(
    mut input: &'a [u8],
    start: u32,
    count: u32,
    table: &mut CrossRefTable,
) -> Option<&'a [u8]> {
    for i in 0..count {
        let (rest, offset) = match token(input).ok()? {
            (rest, Token::Integer(v)) => (rest, v),
            _ => return None,
        };
        let (rest, generation) = match token(rest).ok()? {
            (rest, Token::Integer(v)) => (rest, v),
            _ => return None,
        };
        let (rest, kind) = match token(rest).ok()? {
            (rest, Token::Keyword(k)) => (rest, k),
            _ => return None,
        };
        let offset = u64::try_from(offset).ok()?;
        let generation = u16::try_from(generation).unwrap_or(u16::MAX);
        let entry = match kind {
            b"n" => XRefEntry::uncompressed(offset, generation),
            b"f" => XRefEntry::free(offset, generation),
            _ => return None,
        };
        table.add_entry(start.checked_add(i)?, entry);
        input = rest;
    }
    Some(input)
}

/// Parse a `/Type /XRef` stream object at `offset`.
fn parse_xref_stream(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    let invalid = |reason: String| Error::ParseError {
        offset,
        reason: format!("xref stream: {}", reason),
    };

    let section = data.get(offset..).ok_or(Error::InvalidXref)?;
    let (_, (_, object)) = parse_indirect_object(section)
        .map_err(|_| invalid("not an indirect object".to_string()))?;
    let (dict, raw) = match object {
        Object::Stream { dict, data } => (dict, data),
        other => return Err(invalid(format!("expected a stream, found {}", other.type_name()))),
    };
    if let Some(kind) = dict.get("Type").and_then(Object::as_name) {
        if kind != "XRef" {
            return Err(invalid(format!("/Type is /{}", kind)));
        }
    }

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(Object::as_array)
        .map(|w| w.iter().filter_map(Object::as_integer).map(|v| v.max(0) as usize).collect())
        .unwrap_or_default();
    if widths.len() != 3 || widths.iter().any(|&w| w > 8) {
        return Err(invalid(format!("bad /W {:?}", widths)));
    }
    let entry_size: usize = widths.iter().sum();
    if entry_size == 0 {
        return Err(invalid("empty /W".to_string()));
    }

    let size = dict
        .get("Size")
        .and_then(Object::as_integer)
        .ok_or_else(|| invalid("missing /Size".to_string()))?;
    let as_u32 = |obj: &Object| obj.as_integer().and_then(|v| u32::try_from(v).ok());
    let ranges: Vec<(u32, u32)> = match dict.get("Index").and_then(Object::as_array) {
        Some(index) => index
            .chunks_exact(2)
            .map(|pair| match (as_u32(&pair[0]), as_u32(&pair[1])) {
                (Some(start), Some(count)) => Ok((start, count)),
                _ => Err(invalid(format!("bad /Index pair {:?}", pair))),
            })
            .collect::<Result<_>>()?,
        None => vec![(0, u32::try_from(size).map_err(|_| invalid(format!("bad /Size {}", size)))?)],
    };

    let decoded = decode_stream(&dict, &raw)?;
    let mut rows = decoded.chunks_exact(entry_size);
    let mut table = CrossRefTable::new();

    for (start, count) in ranges {
        for i in 0..count {
            let id = start
                .checked_add(i)
                .ok_or_else(|| invalid(format!("subsection {} {} overflows", start, count)))?;
            let row = rows
                .next()
                .ok_or_else(|| invalid(format!("truncated data at object {}", id)))?;
            let (f1, rest) = row.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);
            let entry_type = if widths[0] == 0 { 1 } else { read_int(f1) };
            let (field2, field3) = (read_int(f2), read_int(f3));

            let entry = match entry_type {
                0 => XRefEntry::free(field2, field3 as u16),
                1 => XRefEntry::uncompressed(field2, field3 as u16),
                2 => XRefEntry::compressed(field2, field3 as u16),
                // Unknown types are references to the null object.
                _ => continue,
            };
            table.add_entry(id, entry);
        }
    }

    table.kind = XRefKind::Stream;
    table.set_trailer(dict);
    Ok(table)
}

/// Big-endian unsigned integer of up to eight bytes.
fn read_int(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::filters::flate_encode;

    const CLASSIC: &[u8] = b"%PDF-1.4\n\
1 0 obj\n<< /Type /Catalog >>\nendobj\n\
xref\n0 2\n0000000000 65535 f \n0000000009 00000 n \n\
trailer\n<< /Size 2 /Root 1 0 R >>\nstartxref\n45\n%%EOF\n";

    #[test]
    fn test_find_xref_offset() {
        assert_eq!(find_xref_offset(CLASSIC).unwrap(), 45);
        assert!(matches!(find_xref_offset(b"%PDF-1.4\n"), Err(Error::InvalidXref)));
        assert!(matches!(find_xref_offset(b"startxref\n999\n"), Err(Error::InvalidXref)));
    }

    #[test]
    fn test_find_xref_offset_uses_last_keyword() {
        let mut data = CLASSIC.to_vec();
        data.extend_from_slice(b"startxref\n10\n%%EOF\n");
        assert_eq!(find_xref_offset(&data).unwrap(), 10);
    }

    #[test]
    fn test_parse_classic_table() {
        let table = parse_xref(CLASSIC, 45).unwrap();
        assert_eq!(table.kind(), XRefKind::Table);
        assert_eq!(table.len(), 2);
        assert!(!table.get(0).unwrap().in_use());
        assert_eq!(table.get(1), Some(&XRefEntry::uncompressed(9, 0)));
        let trailer = table.trailer().unwrap();
        assert_eq!(trailer.get("Size"), Some(&Object::Integer(2)));
    }

    #[test]
    fn test_prev_chain_newest_wins() {
        let mut data = CLASSIC.to_vec();
        let obj_offset = data.len();
        data.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Version /1.7 >>\nendobj\n");
        let xref_offset = data.len();
        data.extend_from_slice(
            format!(
                "xref\n1 1\n{:010} 00000 n \ntrailer\n<< /Size 2 /Root 1 0 R /Prev 45 >>\nstartxref\n{}\n%%EOF\n",
                obj_offset, xref_offset
            )
            .as_bytes(),
        );

        let table = parse_xref(&data, find_xref_offset(&data).unwrap()).unwrap();
        assert_eq!(table.get(1).unwrap().offset, obj_offset as u64);
        assert!(table.contains(0));
        assert_eq!(table.trailer().unwrap().get("Prev"), Some(&Object::Integer(45)));
    }

    #[test]
    fn test_cyclic_prev_is_not_followed_forever() {
        let data = b"xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 /Prev 0 >>\n";
        let table = parse_xref(data, 0).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_parse_xref_stream() {
        // Rows: type(1) offset(2) gen(1)
        let rows: Vec<u8> = vec![0, 0, 0, 255, 1, 0, 15, 0, 2, 0, 5, 3];
        let compressed = flate_encode(&rows).unwrap();
        let mut data = format!(
            "9 0 obj\n<< /Type /XRef /Size 3 /W [1 2 1] /Root 1 0 R /Filter /FlateDecode /Length {} >>\nstream\n",
            compressed.len()
        )
        .into_bytes();
        data.extend_from_slice(&compressed);
        data.extend_from_slice(b"\nendstream\nendobj\n");

        let table = parse_xref(&data, 0).unwrap();
        assert_eq!(table.kind(), XRefKind::Stream);
        assert_eq!(table.get(1), Some(&XRefEntry::uncompressed(15, 0)));
        assert_eq!(table.get(2), Some(&XRefEntry::compressed(5, 3)));
        assert_eq!(table.trailer().unwrap().get("Type"), Some(&Object::name("XRef")));
    }

    #[test]
    fn test_xref_stream_with_index() {
        let rows: Vec<u8> = vec![1, 0, 40, 0];
        let mut data = format!(
            "9 0 obj\n<< /Type /XRef /Size 8 /Index [7 1] /W [1 2 1] /Length {} >>\nstream\n",
            rows.len()
        )
        .into_bytes();
        data.extend_from_slice(&rows);
        data.extend_from_slice(b"\nendstream\nendobj\n");

        let table = parse_xref(&data, 0).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(7), Some(&XRefEntry::uncompressed(40, 0)));
    }

    #[test]
    fn test_truncated_xref_stream() {
        let data = b"9 0 obj\n<< /Type /XRef /Size 3 /W [1 2 1] /Length 4 >>\nstream\n\x01\x00\x0f\x00\nendstream\nendobj\n";
        assert!(parse_xref(data, 0).is_err());
    }

    #[test]
    fn test_garbage_offset() {
        assert!(matches!(parse_xref(CLASSIC, 2), Err(Error::InvalidXref)));
        assert!(parse_xref(CLASSIC, 10_000).is_err());
    }

    #[test]
    fn test_subsection_past_u32_range() {
        let data = b"xref\n4294967295 2\n0000000000 65535 f \n0000000009 00000 n \ntrailer\n<< /Size 2 >>\n";
        assert!(matches!(parse_xref(data, 0), Err(Error::ParseError { .. })));
    }

    #[test]
    fn test_xref_stream_bad_index() {
        for index in ["[4294967295 2]", "[-1 1]", "[0 4294967296]"] {
            let rows: Vec<u8> = vec![1, 0, 40, 0, 1, 0, 50, 0];
            let mut data = format!(
                "9 0 obj\n<< /Type /XRef /Size 8 /Index {} /W [1 2 1] /Length {} >>\nstream\n",
                index,
                rows.len()
            )
            .into_bytes();
            data.extend_from_slice(&rows);
            data.extend_from_slice(b"\nendstream\nendobj\n");
            assert!(
                matches!(parse_xref(&data, 0), Err(Error::ParseError { .. })),
                "index {} was accepted",
                index
            );
        }
    }

    #[test]
    fn test_read_int() {
        assert_eq!(read_int(&[0x01, 0x02]), 0x0102);
        assert_eq!(read_int(&[]), 0);
    }
}

//! PDF object serialization.
//!
//! Output is deterministic: dictionary keys are written in sorted order, so
//! the same object always produces the same bytes. The signer relies on this
//! to locate its placeholders in serialized output.

use super::object::{Dict, Object, ObjectRef};

/// Serializer for PDF objects.
#[derive(Debug, Clone, Default)]
pub struct ObjectSerializer {
    compact: bool,
}

impl ObjectSerializer {
    /// Serializer that puts each dictionary entry on its own line.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializer with minimal whitespace.
    pub fn compact() -> Self {
        Self { compact: true }
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj);
        buf
    }

    /// Serialize an object to a string (for debugging and tests).
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        String::from_utf8_lossy(&self.serialize(obj)).into_owned()
    }

    /// Serialize an indirect object definition:
    /// `{id} {gen} obj\n{object}\nendobj\n`.
    pub fn serialize_indirect(&self, obj_ref: ObjectRef, obj: &Object) -> Vec<u8> {
        let mut buf = format!("{} {} obj\n", obj_ref.id, obj_ref.gen).into_bytes();
        self.write_object(&mut buf, obj);
        buf.extend_from_slice(b"\nendobj\n");
        buf
    }

    fn write_object(&self, out: &mut Vec<u8>, obj: &Object) {
        match obj {
            Object::Null => out.extend_from_slice(b"null"),
            Object::Boolean(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
            Object::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
            Object::Real(r) => out.extend_from_slice(format_real(*r).as_bytes()),
            Object::String(s) => write_string(out, s),
            Object::Name(n) => write_name(out, n),
            Object::Array(items) => {
                out.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    self.write_object(out, item);
                }
                out.push(b']');
            },
            Object::Dictionary(dict) => self.write_dictionary(out, dict),
            Object::Stream { dict, data } => {
                let mut dict = dict.clone();
                dict.insert("Length".to_string(), Object::Integer(data.len() as i64));
                self.write_dictionary(out, &dict);
                out.extend_from_slice(b"\nstream\n");
                out.extend_from_slice(data);
                out.extend_from_slice(b"\nendstream");
            },
            Object::Reference(r) => out.extend_from_slice(r.to_string().as_bytes()),
        }
    }

    fn write_dictionary(&self, out: &mut Vec<u8>, dict: &Dict) {
        out.extend_from_slice(b"<<");
        let mut keys: Vec<&String> = dict.keys().collect();
        keys.sort();

        for key in keys {
            // Null values are equivalent to absent keys.
            let Some(value) = dict.get(key).filter(|v| !v.is_null()) else {
                continue;
            };
            out.extend_from_slice(if self.compact { b" " } else { b"\n  " });
            write_name(out, key);
            out.push(b' ');
            self.write_object(out, value);
        }

        out.extend_from_slice(if self.compact || dict.is_empty() { b" >>" } else { b"\n>>" });
    }
}

/// Format a real number with at most five decimals and no trailing zeros.
///
/// ```
/// # use pdf_signet::pdf::serializer::format_real;
/// assert_eq!(format_real(612.0), "612");
/// assert_eq!(format_real(0.25), "0.25");
/// assert_eq!(format_real(1.0 / 3.0), "0.33333");
/// ```
pub fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let formatted = format!("{:.5}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

/// Literal string syntax for printable ASCII, hex syntax otherwise.
fn write_string(out: &mut Vec<u8>, data: &[u8]) {
    let printable = data
        .iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

    if printable {
        out.push(b'(');
        for &byte in data {
            match byte {
                b'(' => out.extend_from_slice(b"\\("),
                b')' => out.extend_from_slice(b"\\)"),
                b'\\' => out.extend_from_slice(b"\\\\"),
                b'\n' => out.extend_from_slice(b"\\n"),
                b'\r' => out.extend_from_slice(b"\\r"),
                b'\t' => out.extend_from_slice(b"\\t"),
                _ => out.push(byte),
            }
        }
        out.push(b')');
    } else {
        out.push(b'<');
        out.extend_from_slice(to_hex_upper(data).as_bytes());
        out.push(b'>');
    }
}

/// Names start with `/`; delimiters, whitespace, `#` and non-ASCII bytes
/// are written as `#XX`.
fn write_name(out: &mut Vec<u8>, name: &str) {
    out.push(b'/');
    for byte in name.bytes() {
        let regular = (0x21..=0x7E).contains(&byte)
            && !matches!(byte, b'#' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%');
        if regular {
            out.push(byte);
        } else {
            out.extend_from_slice(format!("#{:02X}", byte).as_bytes());
        }
    }
}

/// Uppercase hexadecimal encoding.
pub fn to_hex_upper(bytes: &[u8]) -> String {
    const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";
    let mut hex = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        hex.push(HEX_CHARS[(byte >> 4) as usize] as char);
        hex.push(HEX_CHARS[(byte & 0x0F) as usize] as char);
    }
    hex
}

/// Helper functions for building PDF objects.
impl ObjectSerializer {
    /// Create a Dictionary object.
    pub fn dict(entries: Vec<(&str, Object)>) -> Object {
        Object::Dictionary(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    /// Create a Reference object.
    pub fn reference(obj_ref: ObjectRef) -> Object {
        Object::Reference(obj_ref)
    }

    /// Rectangle array `[llx lly urx ury]`.
    pub fn rect(rect: [f32; 4]) -> Object {
        Object::Array(rect.iter().map(|&v| Object::Real(v as f64)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::parser::parse_object;

    #[test]
    fn test_serialize_primitives() {
        let s = ObjectSerializer::compact();
        assert_eq!(s.serialize_to_string(&Object::Null), "null");
        assert_eq!(s.serialize_to_string(&Object::Boolean(false)), "false");
        assert_eq!(s.serialize_to_string(&Object::Integer(-123)), "-123");
        assert_eq!(s.serialize_to_string(&Object::Real(3.14258)), "3.14258");
        assert_eq!(s.serialize_to_string(&Object::Real(-0.000001)), "0");
        assert_eq!(s.serialize_to_string(&Object::Reference(ObjectRef::new(10, 0))), "10 0 R");
    }

    #[test]
    fn test_serialize_strings() {
        let s = ObjectSerializer::compact();
        assert_eq!(s.serialize_to_string(&Object::String(b"Test (parens)".to_vec())), "(Test \\(parens\\))");
        assert_eq!(s.serialize_to_string(&Object::String(vec![0x00, 0xFF, 0x80])), "<00FF80>");
        assert_eq!(s.serialize_to_string(&Object::String(Vec::new())), "()");
    }

    #[test]
    fn test_serialize_names() {
        let s = ObjectSerializer::compact();
        assert_eq!(s.serialize_to_string(&Object::name("Adobe.PPKLite")), "/Adobe.PPKLite");
        assert_eq!(s.serialize_to_string(&Object::name("Name With Space")), "/Name#20With#20Space");
        assert_eq!(s.serialize_to_string(&Object::name("a/b#c")), "/a#2Fb#23c");
    }

    #[test]
    fn test_dictionary_keys_sorted_and_nulls_dropped() {
        let s = ObjectSerializer::compact();
        let dict = ObjectSerializer::dict(vec![
            ("Type", Object::name("Sig")),
            ("Contents", Object::String(vec![0; 2])),
            ("Gone", Object::Null),
            ("ByteRange", Object::Array(vec![Object::Integer(0)])),
        ]);
        assert_eq!(
            s.serialize_to_string(&dict),
            "<< /ByteRange [0] /Contents <0000> /Type /Sig >>"
        );
    }

    #[test]
    fn test_stream_length_recomputed() {
        let mut dict = Dict::new();
        dict.insert("Length".to_string(), Object::Integer(999));
        let stream = Object::Stream {
            dict,
            data: bytes::Bytes::from_static(b"stream data"),
        };
        let text = ObjectSerializer::compact().serialize_to_string(&stream);
        assert!(text.contains("/Length 11"));
        assert!(text.ends_with("\nstream\nstream data\nendstream"));
    }

    #[test]
    fn test_output_parses_back() {
        let original = ObjectSerializer::dict(vec![
            ("Kids", Object::Array(vec![Object::Reference(ObjectRef::new(3, 0))])),
            ("Title", Object::text("Zażółć")),
            ("Rect", ObjectSerializer::rect([0.0, 0.0, 150.5, 42.0])),
        ]);
        for serializer in [ObjectSerializer::new(), ObjectSerializer::compact()] {
            let bytes = serializer.serialize(&original);
            let (_, parsed) = parse_object(&bytes).unwrap();
            assert_eq!(parsed.get("Kids"), original.get("Kids"));
            assert_eq!(parsed.get("Title"), original.get("Title"));
        }
    }

    #[test]
    fn test_serialize_indirect() {
        let bytes = ObjectSerializer::compact().serialize_indirect(ObjectRef::new(7, 0), &Object::Integer(42));
        assert_eq!(bytes, b"7 0 obj\n42\nendobj\n");
    }

    #[test]
    fn test_hex() {
        assert_eq!(to_hex_upper(&[0xAB, 0x01]), "AB01");
    }
}

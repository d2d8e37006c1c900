//! Object streams (PDF 1.5+).
//!
//! ```text
//! 5 0 obj
//! << /Type /ObjStm /N 2 /First 9 /Filter /FlateDecode >>
//! stream
//! 1 0 2 40          % pairs of (object number, offset from /First)
//! << /Type /Catalog ... >>
//! << /Type /Pages ... >>
//! endstream
//! ```

use super::filters::decode_stream;
use super::lexer::{token, Token};
use super::object::Object;
use super::parser::parse_object;
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Decode an object stream and parse every object it holds.
///
/// # Errors
///
/// Fails when the object is not a stream, `/N` or `/First` is missing, the
/// data cannot be decoded, or an object cannot be parsed.
pub fn parse_object_stream(stream_obj: &Object) -> Result<HashMap<u32, Object>> {
    let (dict, data) = match stream_obj {
        Object::Stream { dict, data } => (dict, data),
        other => {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: other.type_name().to_string(),
            })
        },
    };

    let count = dict
        .get("N")
        .and_then(Object::as_integer)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| Error::InvalidPdf("object stream without /N".to_string()))?;
    let first = dict
        .get("First")
        .and_then(Object::as_integer)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| Error::InvalidPdf("object stream without /First".to_string()))?;

    let decoded = decode_stream(dict, data)?;
    if first > decoded.len() {
        return Err(Error::InvalidPdf(format!(
            "object stream /First {} beyond decoded length {}",
            first,
            decoded.len()
        )));
    }

    let pairs = parse_object_number_pairs(&decoded[..first], count)?;
    let mut objects = HashMap::with_capacity(pairs.len());
    for (obj_num, offset) in pairs {
        let start = first + offset;
        let slice = decoded.get(start..).ok_or_else(|| Error::ParseError {
            offset: start,
            reason: format!("object {} lies outside the object stream", obj_num),
        })?;
        let (_, obj) = parse_object(slice).map_err(|_| Error::ParseError {
            offset: start,
            reason: format!("object {} in object stream is malformed", obj_num),
        })?;
        objects.insert(obj_num, obj);
    }

    log::debug!("Object stream yielded {} objects", objects.len());
    Ok(objects)
}

fn parse_object_number_pairs(data: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(count);
    let mut remaining = data;
    fn next_int(input: &[u8]) -> Option<(usize, &[u8])> {
        match token(input) {
            Ok((rest, Token::Integer(v))) => usize::try_from(v).ok().map(|v| (v, rest)),
            _ => None,
        }
    }

    for i in 0..count {
        let (obj_num, rest) = next_int(remaining).ok_or_else(|| Error::ParseError {
            offset: 0,
            reason: format!("object stream pair {}: bad object number", i),
        })?;
        let (offset, rest) = next_int(rest).ok_or_else(|| Error::ParseError {
            offset: 0,
            reason: format!("object stream pair {}: bad offset", i),
        })?;
        let obj_num = u32::try_from(obj_num).map_err(|_| Error::ParseError {
            offset: 0,
            reason: format!("object number {} out of range", obj_num),
        })?;
        pairs.push((obj_num, offset));
        remaining = rest;
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::filters::flate_encode;
    use crate::pdf::object::Dict;
    use bytes::Bytes;

    fn objstm(body: &[u8], n: i64, first: i64, compress: bool) -> Object {
        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::name("ObjStm"));
        dict.insert("N".to_string(), Object::Integer(n));
        dict.insert("First".to_string(), Object::Integer(first));
        let data = if compress {
            dict.insert("Filter".to_string(), Object::name("FlateDecode"));
            flate_encode(body).unwrap()
        } else {
            body.to_vec()
        };
        Object::Stream {
            dict,
            data: Bytes::from(data),
        }
    }

    #[test]
    fn test_parse_two_objects() {
        let body = b"10 0 11 6 (text)[1 2]";
        let objects = parse_object_stream(&objstm(body, 2, 10, false)).unwrap();
        assert_eq!(objects.get(&10), Some(&Object::String(b"text".to_vec())));
        assert_eq!(
            objects.get(&11),
            Some(&Object::Array(vec![Object::Integer(1), Object::Integer(2)]))
        );
    }

    #[test]
    fn test_parse_compressed() {
        let body = b"1 0 << /Type /Catalog >>";
        let objects = parse_object_stream(&objstm(body, 1, 4, true)).unwrap();
        assert_eq!(objects[&1].get("Type"), Some(&Object::name("Catalog")));
    }

    #[test]
    fn test_missing_entries() {
        let mut stream = objstm(b"1 0 null", 1, 4, false);
        if let Object::Stream { dict, .. } = &mut stream {
            dict.remove("First");
        }
        assert!(parse_object_stream(&stream).is_err());
        assert!(parse_object_stream(&Object::Integer(1)).is_err());
    }

    #[test]
    fn test_too_few_pairs() {
        assert!(parse_object_stream(&objstm(b"1 0 null", 3, 4, false)).is_err());
    }
}

//! PDF object parser.
//!
//! Recursive descent over the lexer's tokens: a token decides the object
//! type, arrays and dictionaries recurse, and `N G R` triples become
//! indirect references by lookahead.

use super::lexer::{skip_ws, token, Token};
use super::object::{Dict, Object, ObjectRef};
use crate::error::{Error, Result};
use nom::IResult;

/// Decode escape sequences in a literal string body (ISO 32000-1:2008, 7.3.4.2).
///
/// ```
/// # use pdf_signet::pdf::parser::decode_literal_string_escapes;
/// assert_eq!(decode_literal_string_escapes(b"a\\(b\\)\\101"), b"a(b)A");
/// ```
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] != b'\\' || i + 1 >= raw.len() {
            result.push(raw[i]);
            i += 1;
            continue;
        }
        match raw[i + 1] {
            b'n' => result.push(b'\n'),
            b'r' => result.push(b'\r'),
            b't' => result.push(b'\t'),
            b'b' => result.push(8),
            b'f' => result.push(12),
            b'(' | b')' | b'\\' => result.push(raw[i + 1]),
            b'\n' => {},
            b'\r' => {
                if raw.get(i + 2) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'0'..=b'7' => {
                let digits = raw[i + 1..]
                    .iter()
                    .take(3)
                    .take_while(|c| (b'0'..=b'7').contains(*c))
                    .count();
                let value = raw[i + 1..i + 1 + digits]
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + (d - b'0') as u32);
                result.push((value & 0xFF) as u8);
                i += 1 + digits;
                continue;
            },
            // Unknown escape: the backslash is dropped
            other => result.push(other),
        }
        i += 2;
    }

    result
}

/// Decode the body of a hex string. Whitespace is ignored and an odd final
/// digit is padded with 0.
///
/// ```
/// # use pdf_signet::pdf::parser::decode_hex;
/// assert_eq!(decode_hex(b"48 65 6C 6C 6F").unwrap(), b"Hello");
/// assert_eq!(decode_hex(b"7").unwrap(), vec![0x70]);
/// ```
pub fn decode_hex(hex_bytes: &[u8]) -> Result<Vec<u8>> {
    let digits: Vec<u8> = hex_bytes
        .iter()
        .copied()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let nibble = |c: u8| -> Result<u8> {
        (c as char)
            .to_digit(16)
            .map(|d| d as u8)
            .ok_or_else(|| Error::ParseError {
                offset: 0,
                reason: format!("invalid hex digit {:?}", c as char),
            })
    };

    digits
        .chunks(2)
        .map(|pair| {
            let high = nibble(pair[0])?;
            let low = match pair.get(1) {
                Some(&c) => nibble(c)?,
                None => 0,
            };
            Ok(high << 4 | low)
        })
        .collect()
}

fn fail(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
}

/// Parse one PDF object.
///
/// ```
/// use pdf_signet::pdf::parser::parse_object;
/// use pdf_signet::pdf::object::{Object, ObjectRef};
///
/// let (_, obj) = parse_object(b"[1 0 R 2 /Name]").unwrap();
/// let items = obj.as_array().unwrap();
/// assert_eq!(items[0], Object::Reference(ObjectRef::new(1, 0)));
/// assert_eq!(items[1], Object::Integer(2));
/// ```
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    let (input, tok) = token(input)?;

    match tok {
        Token::Null => Ok((input, Object::Null)),
        Token::True => Ok((input, Object::Boolean(true))),
        Token::False => Ok((input, Object::Boolean(false))),
        Token::Integer(i) => {
            if let Ok((after_gen, Token::Integer(gen))) = token(input) {
                if let Ok((after_r, Token::R)) = token(after_gen) {
                    if let (Ok(id), Ok(gen)) = (u32::try_from(i), u16::try_from(gen)) {
                        return Ok((after_r, Object::Reference(ObjectRef::new(id, gen))));
                    }
                }
            }
            Ok((input, Object::Integer(i)))
        },
        Token::Real(r) => Ok((input, Object::Real(r))),
        Token::LiteralString(raw) => Ok((input, Object::String(decode_literal_string_escapes(raw)))),
        Token::HexString(raw) => match decode_hex(raw) {
            Ok(decoded) => Ok((input, Object::String(decoded))),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::HexDigit))),
        },
        Token::Name(name) => Ok((input, Object::Name(name))),
        Token::ArrayStart => parse_array(input),
        Token::DictStart => {
            let (remaining, dict) = parse_dictionary(input)?;
            if let Ok((stream_input, Token::StreamStart)) = token(remaining) {
                let (remaining, data) = parse_stream_data(stream_input, &dict)?;
                return Ok((
                    remaining,
                    Object::Stream {
                        dict,
                        data: bytes::Bytes::from(data),
                    },
                ));
            }
            Ok((remaining, Object::Dictionary(dict)))
        },
        _ => Err(fail(input)),
    }
}

fn parse_array(input: &[u8]) -> IResult<&[u8], Object> {
    let mut objects = Vec::new();
    let mut remaining = input;
    loop {
        if let Ok((rest, Token::ArrayEnd)) = token(remaining) {
            return Ok((rest, Object::Array(objects)));
        }
        let (rest, obj) = parse_object(remaining)?;
        objects.push(obj);
        remaining = rest;
    }
}

fn parse_dictionary(input: &[u8]) -> IResult<&[u8], Dict> {
    let mut dict = Dict::new();
    let mut remaining = input;
    loop {
        match token(remaining)? {
            (rest, Token::DictEnd) => return Ok((rest, dict)),
            (rest, Token::Name(key)) => {
                let (rest, value) = parse_object(rest)?;
                // A null value is equivalent to an absent key.
                if !value.is_null() {
                    dict.insert(key, value);
                }
                remaining = rest;
            },
            _ => return Err(fail(remaining)),
        }
    }
}

/// Stream body after the `stream` keyword. A direct `/Length` is trusted when
/// `endstream` follows it; otherwise the data runs up to the next `endstream`
/// minus its end-of-line marker.
fn parse_stream_data<'a>(input: &'a [u8], dict: &Dict) -> IResult<&'a [u8], Vec<u8>> {
    let input = if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") || input.starts_with(b"\r") {
        &input[1..]
    } else {
        input
    };

    if let Some(length) = dict.get("Length").and_then(Object::as_integer) {
        if let Ok(length) = usize::try_from(length) {
            if length <= input.len() {
                if let Ok((rest, Token::StreamEnd)) = token(&input[length..]) {
                    return Ok((rest, input[..length].to_vec()));
                }
            }
        }
        log::debug!("Stream /Length {} does not reach endstream, scanning", length);
    }

    let pos = find_endstream(input).ok_or_else(|| {
        nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Eof))
    })?;
    let mut end = pos;
    if end > 0 && input[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && input[end - 1] == b'\r' {
        end -= 1;
    }
    let rest = &input[pos + b"endstream".len()..];
    Ok((rest, input[..end].to_vec()))
}

fn find_endstream(input: &[u8]) -> Option<usize> {
    let keyword = b"endstream";
    input.windows(keyword.len()).position(|window| window == keyword)
}

/// Parse `N G obj <object> endobj` starting at `input`.
///
/// A missing `endobj` is tolerated.
pub fn parse_indirect_object(input: &[u8]) -> IResult<&[u8], (ObjectRef, Object)> {
    let (rest, id) = token(input)?;
    let (rest, gen) = token(rest)?;
    let (rest, keyword) = token(rest)?;
    let reference = match (id, gen, keyword) {
        (Token::Integer(id), Token::Integer(gen), Token::ObjStart) => {
            match (u32::try_from(id), u16::try_from(gen)) {
                (Ok(id), Ok(gen)) => ObjectRef::new(id, gen),
                _ => return Err(fail(input)),
            }
        },
        _ => return Err(fail(input)),
    };

    let (rest, object) = parse_object(rest)?;
    let rest = match token(rest) {
        Ok((after, Token::ObjEnd)) => after,
        _ => skip_ws(rest),
    };
    Ok((rest, (reference, object)))
}

/// Parse an indirect object located at `offset` in `data`.
pub fn parse_indirect_object_at(data: &[u8], offset: usize) -> Result<(ObjectRef, Object)> {
    let slice = data.get(offset..).ok_or_else(|| Error::ParseError {
        offset,
        reason: "offset beyond end of file".to_string(),
    })?;
    parse_indirect_object(slice)
        .map(|(_, parsed)| parsed)
        .map_err(|e| Error::ParseError {
            offset,
            reason: format!("malformed indirect object: {:?}", e.map(|inner| inner.code)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primitives() {
        assert_eq!(parse_object(b"null").unwrap().1, Object::Null);
        assert_eq!(parse_object(b"true").unwrap().1, Object::Boolean(true));
        assert_eq!(parse_object(b"-7").unwrap().1, Object::Integer(-7));
        assert_eq!(parse_object(b"0.5").unwrap().1, Object::Real(0.5));
        assert_eq!(parse_object(b"/Sig").unwrap().1, Object::name("Sig"));
        assert_eq!(parse_object(b"<414243>").unwrap().1, Object::String(b"ABC".to_vec()));
    }

    #[test]
    fn test_integer_pair_is_not_reference_without_r() {
        let (rest, obj) = parse_object(b"3 0 obj").unwrap();
        assert_eq!(obj, Object::Integer(3));
        assert_eq!(token(rest).unwrap().1, Token::Integer(0));
    }

    #[test]
    fn test_parse_nested_dictionary() {
        let (_, obj) =
            parse_object(b"<< /Type /Catalog /Pages 2 0 R /Kids [ << /A 1 >> ] /Skip null >>")
                .unwrap();
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get("Type"), Some(&Object::name("Catalog")));
        assert_eq!(dict.get("Pages"), Some(&Object::Reference(ObjectRef::new(2, 0))));
        assert!(!dict.contains_key("Skip"));
        let kids = dict.get("Kids").and_then(Object::as_array).unwrap();
        assert_eq!(kids[0].get("A"), Some(&Object::Integer(1)));
    }

    #[test]
    fn test_dictionary_key_must_be_name() {
        assert!(parse_object(b"<< 1 2 >>").is_err());
        assert!(parse_object(b"<< /A 1").is_err());
    }

    #[test]
    fn test_stream_with_length() {
        let (_, obj) = parse_object(b"<< /Length 5 >>\nstream\nhello\nendstream").unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"hello"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_with_wrong_length_scans() {
        let (_, obj) = parse_object(b"<< /Length 99 >>\r\nstream\r\nhello\r\nendstream").unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"hello"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_with_indirect_length_scans() {
        let (_, obj) = parse_object(b"<< /Length 9 0 R >>\nstream\nabc\nendstream").unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"abc"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_literal_escapes() {
        assert_eq!(decode_literal_string_escapes(b"a\\nb"), b"a\nb");
        assert_eq!(decode_literal_string_escapes(b"\\247"), vec![0xA7]);
        assert_eq!(decode_literal_string_escapes(b"\\0053"), b"\x053");
        assert_eq!(decode_literal_string_escapes(b"line\\\r\nnext"), b"linenext");
        assert_eq!(decode_literal_string_escapes(b"\\q"), b"q");
        assert_eq!(decode_literal_string_escapes(b"end\\"), b"end\\");
    }

    #[test]
    fn test_decode_hex_rejects_garbage() {
        assert!(decode_hex(b"4G").is_err());
        assert_eq!(decode_hex(b"").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_parse_indirect_object() {
        let data = b"%PDF-1.4\n4 0 obj\n<< /Type /Page >>\nendobj\n";
        let (reference, obj) = parse_indirect_object_at(data, 9).unwrap();
        assert_eq!(reference, ObjectRef::new(4, 0));
        assert_eq!(obj.get("Type"), Some(&Object::name("Page")));
    }

    #[test]
    fn test_parse_indirect_object_bad_offset() {
        let data = b"4 0 obj 1 endobj";
        assert!(parse_indirect_object_at(data, 2).is_err());
        assert!(parse_indirect_object_at(data, 100).is_err());
    }
}

//! Stream filters needed to read document structure.
//!
//! Cross-reference streams and object streams are almost always
//! FlateDecode-compressed, often with a PNG predictor on top. Those are the
//! only filters the reader has to undo; content streams and images are copied
//! through untouched.

use super::object::{Dict, Object};
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Predictor parameters from a `/DecodeParms` dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Number of samples per row
    pub columns: usize,
    /// Colour components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    /// Read parameters from a `/DecodeParms` dictionary, keeping defaults for
    /// missing entries.
    pub fn from_dict(dict: &Dict) -> Self {
        let get = |key: &str| dict.get(key).and_then(Object::as_integer);
        let defaults = Self::default();
        Self {
            predictor: get("Predictor").unwrap_or(defaults.predictor),
            columns: get("Columns").map(|v| v.max(1) as usize).unwrap_or(defaults.columns),
            colors: get("Colors").map(|v| v.max(1) as usize).unwrap_or(defaults.colors),
            bits_per_component: get("BitsPerComponent")
                .map(|v| v.max(1) as usize)
                .unwrap_or(defaults.bits_per_component),
        }
    }

    fn pixel_bytes_per_row(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Decompress zlib data, falling back to raw deflate for streams with a
/// damaged header.
pub fn flate_decode(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    match ZlibDecoder::new(input).read_to_end(&mut output) {
        Ok(_) => return Ok(output),
        Err(e) if !output.is_empty() => {
            log::warn!("FlateDecode partial recovery: {} bytes before error: {}", output.len(), e);
            return Ok(output);
        },
        Err(e) => log::debug!("Zlib decode failed ({}), trying raw deflate", e),
    }

    output.clear();
    DeflateDecoder::new(input)
        .read_to_end(&mut output)
        .map_err(|e| Error::InvalidPdf(format!("FlateDecode failed: {}", e)))?;
    Ok(output)
}

/// Compress data with zlib at the default level.
pub fn flate_encode(input: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(input)?;
    Ok(encoder.finish()?)
}

/// Undo a predictor.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => decode_tiff_predictor(data, params),
        10..=15 => decode_png_predictor(data, params),
        other => Err(Error::Unsupported(format!("predictor {}", other))),
    }
}

fn decode_tiff_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(Error::Unsupported(format!(
            "TIFF predictor with {} bits per component",
            params.bits_per_component
        )));
    }
    let row_len = params.pixel_bytes_per_row();
    let bpp = params.bytes_per_pixel();
    let mut output = data.to_vec();
    for row in output.chunks_mut(row_len) {
        for i in bpp..row.len() {
            row[i] = row[i].wrapping_add(row[i - bpp]);
        }
    }
    Ok(output)
}

/// PNG predictors. Every row starts with its own filter-type byte,
/// whatever the `/Predictor` value between 10 and 15 says.
fn decode_png_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let pixel_bytes = params.pixel_bytes_per_row();
    let row_len = pixel_bytes + 1;
    let bpp = params.bytes_per_pixel();

    if data.len() % row_len != 0 {
        log::warn!(
            "Predictor data length {} is not a multiple of row size {}, dropping tail",
            data.len(),
            row_len
        );
    }

    let mut output: Vec<u8> = Vec::with_capacity(data.len() / row_len * pixel_bytes);
    let mut previous = vec![0u8; pixel_bytes];

    for row in data.chunks_exact(row_len) {
        let tag = row[0];
        let mut current = row[1..].to_vec();
        for i in 0..pixel_bytes {
            let left = if i >= bpp { current[i - bpp] } else { 0 };
            let up = previous[i];
            let up_left = if i >= bpp { previous[i - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => {
                    return Err(Error::InvalidPdf(format!("invalid PNG predictor tag {}", other)))
                },
            };
            current[i] = current[i].wrapping_add(predicted);
        }
        output.extend_from_slice(&current);
        previous = current;
    }

    Ok(output)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Decode the data of a stream object according to its `/Filter` and
/// `/DecodeParms`.
///
/// # Errors
///
/// `Error::Unsupported` for any filter other than FlateDecode, and
/// `Error::InvalidPdf` when the compressed data is corrupt.
pub fn decode_stream(dict: &Dict, data: &[u8]) -> Result<Vec<u8>> {
    let filters: Vec<&str> = match dict.get("Filter") {
        None => Vec::new(),
        Some(Object::Name(name)) => vec![name.as_str()],
        Some(Object::Array(items)) => items.iter().filter_map(Object::as_name).collect(),
        Some(other) => {
            return Err(Error::InvalidObjectType {
                expected: "Name or Array".to_string(),
                found: other.type_name().to_string(),
            })
        },
    };
    let parms: Vec<Option<&Dict>> = match dict.get("DecodeParms") {
        Some(Object::Array(items)) => items.iter().map(Object::as_dict).collect(),
        Some(other) => vec![other.as_dict()],
        None => Vec::new(),
    };

    let mut current = data.to_vec();
    for (i, filter) in filters.iter().enumerate() {
        current = match *filter {
            "FlateDecode" | "Fl" => {
                let inflated = flate_decode(&current)?;
                match parms.get(i).copied().flatten() {
                    Some(p) => decode_predictor(&inflated, &DecodeParams::from_dict(p))?,
                    None => inflated,
                }
            },
            other => return Err(Error::Unsupported(format!("stream filter {}", other))),
        };
    }
    Ok(current)
}

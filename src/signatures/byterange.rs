//! ByteRange calculation for PDF signatures.
//!
//! PDF digital signatures use a ByteRange array to specify which portions
//! of the document are covered by the signature. The signature itself is
//! stored in a placeholder that is excluded from the signed bytes.
//!
//! ## ByteRange Format
//!
//! The ByteRange is an array of four integers:
//! `[offset1, length1, offset2, length2]`
//!
//! Where:
//! - `offset1` = 0 (start of file)
//! - `length1` = byte offset where the signature value begins
//! - `offset2` = byte offset where the signature value ends
//! - `length2` = remaining bytes to end of file
//!
//! The signature value is a hex-encoded string within `<` and `>` delimiters.
//! Both the `/Contents` value and the `/ByteRange` array are written with a
//! fixed width first and patched in place once the file is assembled, so no
//! offset moves after the ranges are computed.

use crate::error::{Error, Result};
use crate::pdf::object::Object;
use crate::pdf::serializer::to_hex_upper;

/// Wide integer used in the `/ByteRange` placeholder. Ten digits are enough
/// for any file below 10 GB.
const BYTE_RANGE_FILLER: i64 = 9_999_999_999;

/// Calculator for PDF signature byte ranges.
#[derive(Debug, Clone)]
pub struct ByteRangeCalculator {
    /// Size of the placeholder for the signature value (hex digits + 2 for angle brackets)
    placeholder_size: usize,
}

impl ByteRangeCalculator {
    /// Create a new ByteRange calculator with the specified signature size.
    ///
    /// The placeholder size will be `(signature_size * 2) + 2` because the
    /// signature is hex-encoded and enclosed in angle brackets.
    pub fn new(estimated_signature_size: usize) -> Self {
        Self {
            placeholder_size: estimated_signature_size * 2 + 2,
        }
    }

    /// Create a ByteRange calculator with a specific placeholder size.
    pub fn with_placeholder_size(placeholder_size: usize) -> Self {
        Self {
            placeholder_size: placeholder_size.max(2),
        }
    }

    /// Get the placeholder size (for the /Contents value).
    pub fn placeholder_size(&self) -> usize {
        self.placeholder_size
    }

    /// Largest encoded signature that fits the reservation, in bytes.
    pub fn capacity(&self) -> usize {
        (self.placeholder_size - 2) / 2
    }

    /// `/Contents` value to put in the signature dictionary. It serializes
    /// to exactly [`generate_placeholder`](Self::generate_placeholder).
    pub fn contents_placeholder(&self) -> Object {
        Object::String(vec![0u8; self.capacity()])
    }

    /// Serialized form of the `/Contents` placeholder: `<000...000>`.
    pub fn generate_placeholder(&self) -> String {
        format!("<{}>", "0".repeat(self.placeholder_size - 2))
    }

    /// `/ByteRange` value to put in the signature dictionary.
    pub fn byte_range_placeholder() -> Object {
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(BYTE_RANGE_FILLER),
            Object::Integer(BYTE_RANGE_FILLER),
            Object::Integer(BYTE_RANGE_FILLER),
        ])
    }

    /// Serialized form of [`byte_range_placeholder`](Self::byte_range_placeholder).
    pub fn generate_byte_range_placeholder() -> String {
        format!(
            "[0 {} {} {}]",
            BYTE_RANGE_FILLER, BYTE_RANGE_FILLER, BYTE_RANGE_FILLER
        )
    }

    /// Calculate the ByteRange array given the position of the /Contents value.
    ///
    /// `contents_offset` is the offset of the opening `<`. The result is
    /// `[0, before_sig, after_sig_start, after_sig_len]`.
    pub fn calculate_byte_range(&self, file_size: usize, contents_offset: usize) -> [i64; 4] {
        let before_sig = contents_offset as i64;
        let after_sig_start = (contents_offset + self.placeholder_size) as i64;
        let after_sig_len = file_size as i64 - after_sig_start;

        [0, before_sig, after_sig_start, after_sig_len]
    }

    /// Format a ByteRange array as a PDF array string.
    pub fn format_byte_range(byte_range: &[i64; 4]) -> String {
        format!("[{} {} {} {}]", byte_range[0], byte_range[1], byte_range[2], byte_range[3])
    }

    /// Overwrite the `/ByteRange` placeholder at `array_offset` (the `[`)
    /// with the real values, padding with spaces before the `]`.
    pub fn patch_byte_range(pdf_data: &mut [u8], array_offset: usize, byte_range: &[i64; 4]) -> Result<()> {
        let width = Self::generate_byte_range_placeholder().len();
        let formatted = Self::format_byte_range(byte_range);
        if formatted.len() > width {
            return Err(Error::Signing(format!(
                "ByteRange {} does not fit its {} byte placeholder",
                formatted, width
            )));
        }
        let region = pdf_data
            .get_mut(array_offset..array_offset + width)
            .ok_or_else(|| Error::Signing("ByteRange placeholder lies outside the file".to_string()))?;

        let mut padded = formatted.into_bytes();
        padded.pop();
        padded.resize(width - 1, b' ');
        padded.push(b']');
        region.copy_from_slice(&padded);
        Ok(())
    }

    /// Extract the bytes to be signed from a PDF file.
    ///
    /// This returns the concatenation of the two ranges specified by ByteRange.
    pub fn extract_signed_bytes(pdf_data: &[u8], byte_range: &[i64; 4]) -> Result<Vec<u8>> {
        let to_usize = |v: i64| {
            usize::try_from(v).map_err(|_| Error::InvalidPdf(format!("negative ByteRange value {}", v)))
        };
        let offset1 = to_usize(byte_range[0])?;
        let length1 = to_usize(byte_range[1])?;
        let offset2 = to_usize(byte_range[2])?;
        let length2 = to_usize(byte_range[3])?;

        if offset1 + length1 > pdf_data.len() {
            return Err(Error::InvalidPdf(format!(
                "ByteRange first range exceeds file size: {} + {} > {}",
                offset1,
                length1,
                pdf_data.len()
            )));
        }
        if offset2 + length2 > pdf_data.len() {
            return Err(Error::InvalidPdf(format!(
                "ByteRange second range exceeds file size: {} + {} > {}",
                offset2,
                length2,
                pdf_data.len()
            )));
        }

        let mut signed_bytes = Vec::with_capacity(length1 + length2);
        signed_bytes.extend_from_slice(&pdf_data[offset1..offset1 + length1]);
        signed_bytes.extend_from_slice(&pdf_data[offset2..offset2 + length2]);

        Ok(signed_bytes)
    }

    /// Check if a ByteRange covers the entire document except the signature.
    ///
    /// A valid ByteRange starts at offset 0, ends at the file size and has no
    /// gap other than the signature value.
    pub fn validate_byte_range(byte_range: &[i64; 4], file_size: usize) -> Result<()> {
        let [offset1, length1, offset2, length2] = *byte_range;

        if offset1 != 0 {
            return Err(Error::InvalidPdf(format!("ByteRange must start at 0, got {}", offset1)));
        }

        let expected_end = file_size as i64;
        let actual_end = offset2 + length2;
        if actual_end != expected_end {
            return Err(Error::InvalidPdf(format!(
                "ByteRange must end at file size {}, got {}",
                expected_end, actual_end
            )));
        }

        if length1 > offset2 {
            return Err(Error::InvalidPdf(format!(
                "ByteRange first range ({}) overlaps with second range start ({})",
                length1, offset2
            )));
        }

        Ok(())
    }

    /// Find `/{key} {placeholder}` in `window`, which starts at byte
    /// `window_offset` of the file. Returns the file offset of the
    /// placeholder value.
    pub fn find_placeholder(window: &[u8], window_offset: usize, key: &str, placeholder: &str) -> Option<usize> {
        let pattern = format!("/{} {}", key, placeholder);
        let pattern = pattern.as_bytes();
        window
            .windows(pattern.len())
            .position(|w| w == pattern)
            .map(|pos| window_offset + pos + key.len() + 2)
    }

    /// Replace the placeholder in the PDF with the actual signature.
    ///
    /// # Errors
    ///
    /// `Error::Signing` when the encoded signature is larger than the
    /// reservation.
    pub fn insert_signature(&self, pdf_data: &mut [u8], contents_offset: usize, signature: &[u8]) -> Result<()> {
        let signature_hex = to_hex_upper(signature);
        let sig_len = signature_hex.len() + 2;
        if sig_len > self.placeholder_size {
            return Err(Error::Signing(format!(
                "signature of {} bytes exceeds the {} bytes reserved for it",
                signature.len(),
                self.capacity()
            )));
        }

        let mut sig_value = String::with_capacity(self.placeholder_size);
        sig_value.push('<');
        sig_value.push_str(&signature_hex);
        sig_value.push_str(&"0".repeat(self.placeholder_size - sig_len));
        sig_value.push('>');

        let region = pdf_data
            .get_mut(contents_offset..contents_offset + self.placeholder_size)
            .ok_or_else(|| Error::Signing("signature insertion would exceed file bounds".to_string()))?;
        region.copy_from_slice(sig_value.as_bytes());

        Ok(())
    }
}

impl Default for ByteRangeCalculator {
    fn default() -> Self {
        Self::new(8192)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::serializer::ObjectSerializer;

    #[test]
    fn test_placeholder_size() {
        let calc = ByteRangeCalculator::new(1024);
        // 1024 bytes * 2 (hex) + 2 (brackets) = 2050
        assert_eq!(calc.placeholder_size(), 2050);
        assert_eq!(calc.capacity(), 1024);
    }

    #[test]
    fn test_generate_placeholder() {
        let calc = ByteRangeCalculator::with_placeholder_size(10);
        let placeholder = calc.generate_placeholder();
        assert_eq!(placeholder, "<00000000>");
        assert_eq!(placeholder.len(), 10);
    }

    #[test]
    fn test_placeholders_serialize_to_their_text() {
        let calc = ByteRangeCalculator::new(16);
        let s = ObjectSerializer::compact();
        assert_eq!(s.serialize_to_string(&calc.contents_placeholder()), calc.generate_placeholder());
        assert_eq!(
            s.serialize_to_string(&ByteRangeCalculator::byte_range_placeholder()),
            ByteRangeCalculator::generate_byte_range_placeholder()
        );
    }

    #[test]
    fn test_calculate_byte_range() {
        let calc = ByteRangeCalculator::with_placeholder_size(100);
        let byte_range = calc.calculate_byte_range(1000, 400);
        assert_eq!(byte_range, [0, 400, 500, 500]);
    }

    #[test]
    fn test_format_byte_range() {
        let formatted = ByteRangeCalculator::format_byte_range(&[0, 100, 200, 300]);
        assert_eq!(formatted, "[0 100 200 300]");
    }

    #[test]
    fn test_patch_byte_range_keeps_width() {
        let placeholder = ByteRangeCalculator::generate_byte_range_placeholder();
        let mut data = format!("/ByteRange {} >>", placeholder).into_bytes();
        let original_len = data.len();
        ByteRangeCalculator::patch_byte_range(&mut data, 11, &[0, 10, 20, 5]).unwrap();
        assert_eq!(data.len(), original_len);
        let text = String::from_utf8(data).unwrap();
        assert!(text.starts_with("/ByteRange [0 10 20 5 "));
        assert!(text.ends_with("] >>"));
    }

    #[test]
    fn test_find_placeholder() {
        let calc = ByteRangeCalculator::with_placeholder_size(6);
        let window = b"<< /ContactInfo (x) /Contents <0000> /Type /Sig >>";
        let found = ByteRangeCalculator::find_placeholder(window, 100, "Contents", &calc.generate_placeholder());
        assert_eq!(found, Some(100 + 30));
        assert_eq!(ByteRangeCalculator::find_placeholder(window, 0, "Reason", "<0000>"), None);
    }

    #[test]
    fn test_extract_signed_bytes() {
        let signed = ByteRangeCalculator::extract_signed_bytes(b"AAABBBCCC", &[0, 3, 6, 3]).unwrap();
        assert_eq!(signed, b"AAACCC");
        assert!(ByteRangeCalculator::extract_signed_bytes(b"AAA", &[0, 3, 6, 3]).is_err());
    }

    #[test]
    fn test_validate_byte_range() {
        assert!(ByteRangeCalculator::validate_byte_range(&[0, 100, 150, 50], 200).is_ok());
        assert!(ByteRangeCalculator::validate_byte_range(&[10, 100, 150, 50], 200).is_err());
        assert!(ByteRangeCalculator::validate_byte_range(&[0, 100, 150, 100], 200).is_err());
        assert!(ByteRangeCalculator::validate_byte_range(&[0, 160, 150, 50], 200).is_err());
    }

    #[test]
    fn test_insert_signature() {
        let calc = ByteRangeCalculator::with_placeholder_size(10);
        let mut pdf_data = b"XX<00000000>YY".to_vec();
        calc.insert_signature(&mut pdf_data, 2, &[0xAB, 0xCD]).unwrap();
        assert_eq!(&pdf_data, b"XX<ABCD0000>YY");
    }

    #[test]
    fn test_insert_signature_too_large() {
        let calc = ByteRangeCalculator::with_placeholder_size(10);
        let mut pdf_data = b"XX<00000000>YY".to_vec();
        let result = calc.insert_signature(&mut pdf_data, 2, &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);
        assert!(matches!(result, Err(Error::Signing(_))));
    }
}

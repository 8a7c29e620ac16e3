//! XML encoding detection and conversion
//!
//! Detects UTF-16 input from the byte order mark or the first angle
//! bracket and converts it to UTF-8 before tokenizing.

use crate::error::{Error, Position, Result};

/// Detected encoding of raw XML input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl XmlEncoding {
    /// Detect encoding from a byte order mark or initial bytes.
    pub fn detect(input: &[u8]) -> Self {
        if input.len() < 2 {
            return XmlEncoding::Utf8;
        }
        match (input[0], input[1]) {
            (0xFF, 0xFE) => XmlEncoding::Utf16Le,
            (0xFE, 0xFF) => XmlEncoding::Utf16Be,
            (0xEF, 0xBB) if input.len() >= 3 && input[2] == 0xBF => XmlEncoding::Utf8,
            // No BOM: '<' next to a null byte betrays UTF-16.
            (0x00, b'<') => XmlEncoding::Utf16Be,
            (b'<', 0x00) => XmlEncoding::Utf16Le,
            _ => XmlEncoding::Utf8,
        }
    }
}

/// Convert raw input to UTF-8, stripping any BOM.
pub fn convert_to_utf8(input: Vec<u8>) -> Result<Vec<u8>> {
    match XmlEncoding::detect(&input) {
        XmlEncoding::Utf8 => {
            if input.starts_with(&[0xEF, 0xBB, 0xBF]) {
                Ok(input[3..].to_vec())
            } else {
                Ok(input)
            }
        }
        XmlEncoding::Utf16Le => convert_utf16(&input, &[0xFF, 0xFE], u16::from_le_bytes),
        XmlEncoding::Utf16Be => convert_utf16(&input, &[0xFE, 0xFF], u16::from_be_bytes),
    }
}

fn convert_utf16(input: &[u8], bom: &[u8], decode: fn([u8; 2]) -> u16) -> Result<Vec<u8>> {
    let start = if input.starts_with(bom) { 2 } else { 0 };
    let bytes = &input[start..];
    if bytes.len() % 2 != 0 {
        return Err(Error::parse(
            Position::new(1, 1, input.len()),
            "UTF-16 input has an odd number of bytes",
        ));
    }
    let code_units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|chunk| decode([chunk[0], chunk[1]]))
        .collect();
    String::from_utf16(&code_units)
        .map(String::into_bytes)
        .map_err(|_| Error::parse(Position::new(1, 1, 0), "invalid UTF-16 input"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_utf8() {
        assert_eq!(XmlEncoding::detect(b"<root/>"), XmlEncoding::Utf8);
        assert_eq!(XmlEncoding::detect(b"<?xml"), XmlEncoding::Utf8);
        assert_eq!(
            XmlEncoding::detect(&[0xEF, 0xBB, 0xBF, b'<']),
            XmlEncoding::Utf8
        );
    }

    #[test]
    fn detect_utf16() {
        assert_eq!(
            XmlEncoding::detect(&[0xFF, 0xFE, b'<', 0x00]),
            XmlEncoding::Utf16Le
        );
        assert_eq!(
            XmlEncoding::detect(&[0xFE, 0xFF, 0x00, b'<']),
            XmlEncoding::Utf16Be
        );
        assert_eq!(XmlEncoding::detect(&[b'<', 0x00]), XmlEncoding::Utf16Le);
    }

    #[test]
    fn convert_utf16_le() {
        let utf16_le = vec![
            0xFF, 0xFE, b'<', 0x00, b'r', 0x00, b'/', 0x00, b'>', 0x00,
        ];
        assert_eq!(convert_to_utf8(utf16_le).unwrap(), b"<r/>");
    }

    #[test]
    fn convert_utf16_be() {
        let utf16_be = vec![
            0xFE, 0xFF, 0x00, b'<', 0x00, b'r', 0x00, b'/', 0x00, b'>',
        ];
        assert_eq!(convert_to_utf8(utf16_be).unwrap(), b"<r/>");
    }

    #[test]
    fn utf8_passthrough() {
        let utf8 = b"<root>hello</root>".to_vec();
        assert_eq!(convert_to_utf8(utf8.clone()).unwrap(), utf8);
    }

    #[test]
    fn odd_length_utf16_rejected() {
        let bad = vec![0xFF, 0xFE, b'<'];
        assert!(convert_to_utf8(bad).is_err());
    }
}

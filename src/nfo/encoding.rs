//! Byte-encoding detection for descriptor files.
//!
//! Descriptors ripped years ago are frequently Shift_JIS, GBK or UTF-16
//! rather than UTF-8, and declare nothing. Detection runs over the raw bytes
//! before any parsing.

use chardetng::EncodingDetector;

/// Decode a descriptor's raw bytes into a string, guessing the encoding and
/// stripping a leading byte-order mark.
pub fn decode_descriptor_bytes(bytes: &[u8]) -> String {
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);

    // decode() already sniffs and drops a BOM matching the chosen encoding;
    // the explicit strip covers a BOM the detector mis-attributed.
    let (decoded, _, _) = encoding.decode(bytes);
    let text = decoded.into_owned();
    match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_plain_utf8() {
        let text = "<movie><title>hello</title></movie>";
        assert_eq!(decode_descriptor_bytes(text.as_bytes()), text);
    }

    #[test]
    fn test_strips_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"<movie/>");
        assert_eq!(decode_descriptor_bytes(&bytes), "<movie/>");
    }

    #[test]
    fn test_decodes_gbk() {
        let (encoded, _, _) = encoding_rs::GBK.encode("<movie><title>电影标题</title></movie>");
        let decoded = decode_descriptor_bytes(&encoded);
        assert!(decoded.contains("电影标题"));
    }

    #[test]
    fn test_decodes_utf16le_with_bom() {
        let text = "<movie><title>abc</title></movie>";
        let mut bytes = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_descriptor_bytes(&bytes), text);
    }
}

//! Byte-order-mark sniffing for fetched file contents

/// Encoding announced by a leading byte-order mark
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf16Le,
    Utf16Be,
    Utf8,
}

/// Guess the encoding from the first two bytes
///
/// Returns `None` when no byte-order mark is present; callers fall back to
/// UTF-8.
pub fn sniff_encoding(bytes: &[u8]) -> Option<TextEncoding> {
    match bytes {
        [0xFF, 0xFE, ..] => Some(TextEncoding::Utf16Le),
        [0xFE, 0xFF, ..] => Some(TextEncoding::Utf16Be),
        [0xEF, 0xBB, ..] => Some(TextEncoding::Utf8),
        _ => None,
    }
}

/// Decode raw file bytes to text, dropping the byte-order mark
pub fn decode_text(bytes: &[u8]) -> String {
    match sniff_encoding(bytes) {
        Some(TextEncoding::Utf16Le) => decode_utf16(&bytes[2..], u16::from_le_bytes),
        Some(TextEncoding::Utf16Be) => decode_utf16(&bytes[2..], u16::from_be_bytes),
        Some(TextEncoding::Utf8) | None => {
            let text = String::from_utf8_lossy(bytes);
            match text.strip_prefix('\u{feff}') {
                Some(rest) => rest.to_string(),
                None => text.into_owned(),
            }
        }
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let chunks = bytes.chunks_exact(2);
    let odd = !chunks.remainder().is_empty();
    let units: Vec<u16> = chunks.map(|pair| unit([pair[0], pair[1]])).collect();
    let mut text = String::from_utf16_lossy(&units);
    if odd {
        text.push(char::REPLACEMENT_CHARACTER);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_byte_order_marks() {
        assert_eq!(sniff_encoding(&[0xFF, 0xFE, 0x41, 0x00]), Some(TextEncoding::Utf16Le));
        assert_eq!(sniff_encoding(&[0xFE, 0xFF, 0x00, 0x41]), Some(TextEncoding::Utf16Be));
        assert_eq!(sniff_encoding(&[0xEF, 0xBB, 0xBF, b'a']), Some(TextEncoding::Utf8));
    }

    #[test]
    fn test_sniff_plain_text_is_undetermined() {
        assert_eq!(sniff_encoding(b"plain ascii"), None);
        assert_eq!(sniff_encoding(b"ab"), None);
        assert_eq!(sniff_encoding(&[0xFF]), None);
        assert_eq!(sniff_encoding(&[]), None);
    }

    #[test]
    fn test_decode_utf16_both_orders() {
        assert_eq!(decode_text(&[0xFF, 0xFE, b'h', 0, b'i', 0]), "hi");
        assert_eq!(decode_text(&[0xFE, 0xFF, 0, b'h', 0, b'i']), "hi");
    }

    #[test]
    fn test_decode_utf8_strips_bom() {
        assert_eq!(decode_text(&[0xEF, 0xBB, 0xBF, b'o', b'k']), "ok");
        assert_eq!(decode_text("héllo".as_bytes()), "héllo");
    }

    #[test]
    fn test_decode_invalid_utf8_is_lossy() {
        assert_eq!(decode_text(&[b'a', 0xC3, b'b']), "a\u{fffd}b");
    }
}

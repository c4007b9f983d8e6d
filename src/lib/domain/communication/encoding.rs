//! BASE64 handling and RFC 2047 encoded-words

use base64::{
    alphabet,
    engine::{
        general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD},
        DecodePaddingMode,
    },
    DecodeError, Engine as _,
};

/// Standard alphabet, padding optional when decoding.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Maximum payload bytes per encoded-word, keeping each word within 75 characters.
const MAX_WORD_BYTES: usize = 45;

/// Decodes a BASE64 string (standard alphabet, padding optional).
pub fn decode_base64(content: &str) -> Result<Vec<u8>, DecodeError> {
    LENIENT.decode(content)
}

/// Returns `true` if `content` is non-empty and decodes as BASE64.
pub fn is_valid_base64(content: &str) -> bool {
    !content.is_empty() && decode_base64(content).is_ok()
}

/// Encodes bytes as padded, standard-alphabet BASE64.
pub fn encode_base64(content: &[u8]) -> String {
    STANDARD.encode(content)
}

/// Encodes a header phrase as RFC 2047 "B" encoded-words.
///
/// Printable ASCII is returned unchanged. Anything else is split on character
/// boundaries into words of at most 75 characters, separated by a space.
pub fn encode_word(text: &str) -> String {
    if text.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
        return text.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();

    for c in text.chars() {
        if chunk.len() + c.len_utf8() > MAX_WORD_BYTES {
            words.push(encoded_word(&chunk));
            chunk.clear();
        }
        chunk.push(c);
    }

    if !chunk.is_empty() {
        words.push(encoded_word(&chunk));
    }

    words.join(" ")
}

fn encoded_word(chunk: &str) -> String {
    format!("=?UTF-8?B?{}?=", STANDARD.encode(chunk.as_bytes()))
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn test_decode_padded_and_unpadded() -> TestResult {
        assert_eq!(decode_base64("PHA+aHRtbDwvcD4=")?, b"<p>html</p>");
        assert_eq!(decode_base64("PHA+aHRtbDwvcD4")?, b"<p>html</p>");

        Ok(())
    }

    #[test]
    fn test_invalid_base64() {
        assert!(!is_valid_base64("Not base64"));
        assert!(!is_valid_base64("someContent!"));
        assert!(!is_valid_base64(""));
        assert!(is_valid_base64("aGVsbG8gd29ybGQK"));
    }

    #[test]
    fn test_encode_word_keeps_ascii() {
        assert_eq!(encode_word("Sundsvalls Kommun"), "Sundsvalls Kommun");
        assert_eq!(encode_word("N"), "N");
    }

    #[test]
    fn test_encode_word_encodes_non_ascii() {
        assert_eq!(encode_word("Åsa"), "=?UTF-8?B?w4VzYQ==?=");
    }

    #[test]
    fn test_encode_word_splits_long_text() -> TestResult {
        let name = "Ångermanlands kommunförbund för äldreomsorg och socialtjänst";
        let encoded = encode_word(name);

        let words: Vec<&str> = encoded.split(' ').collect();
        assert!(words.len() > 1);

        let mut decoded = Vec::new();
        for word in words {
            assert!(word.len() <= 75, "encoded word too long: {word}");

            let payload = word
                .strip_prefix("=?UTF-8?B?")
                .and_then(|w| w.strip_suffix("?="))
                .expect("encoded word");
            decoded.extend(decode_base64(payload)?);
        }

        assert_eq!(String::from_utf8(decoded)?, name);

        Ok(())
    }
}

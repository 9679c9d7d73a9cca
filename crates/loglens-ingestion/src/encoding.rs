//! Text Encoding Resolution
//!
//! Guesses the encoding of a downloaded log file and decodes it. SQL Server
//! writes its `ERRORLOG` files as UTF-16LE, agents and collectors often
//! re-save them as UTF-8 or a Windows code page, so every file goes through
//! detection first. Decoding never fails: text that is malformed in the
//! detected encoding is decoded again as ISO-8859-1.

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use serde::Serialize;
use tracing::{debug, warn};

/// Reported when no encoding could be guessed
pub const UNKNOWN_ENCODING: &str = "unknown";

/// Byte-safe fallback. The WHATWG label `iso-8859-1` resolves to
/// windows-1252, which maps every byte to a character.
pub const FALLBACK_ENCODING: &Encoding = WINDOWS_1252;

/// Bytes inspected by the UTF-16 heuristic
const SNIFF_LEN: usize = 4096;

/// Share of NUL bytes in one lane needed to call a BOM-less file UTF-16
const UTF16_NUL_RATIO: f32 = 0.3;

/// Outcome of encoding detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodingGuess {
    /// Detected encoding, `None` when detection had nothing to go on
    pub encoding: Option<&'static Encoding>,
    /// 0.0 ..= 1.0
    pub confidence: f32,
}

impl EncodingGuess {
    pub fn new(encoding: &'static Encoding, confidence: f32) -> Self {
        Self {
            encoding: Some(encoding),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn unknown() -> Self {
        Self {
            encoding: None,
            confidence: 0.0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.encoding.map_or(UNKNOWN_ENCODING, |e| e.name())
    }
}

/// Decoded file content
#[derive(Debug, Clone, Serialize)]
pub struct DecodedText {
    pub text: String,
    /// Encoding the text was finally decoded with
    pub encoding: &'static str,
    /// Confidence of the original guess
    pub confidence: f32,
    /// The detected encoding could not decode the bytes
    pub fallback_used: bool,
}

/// Encoding detector and decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodingResolver;

impl EncodingResolver {
    pub fn new() -> Self {
        Self
    }

    /// Guess the encoding of `bytes`
    pub fn resolve(&self, bytes: &[u8]) -> EncodingGuess {
        if bytes.is_empty() {
            return EncodingGuess::unknown();
        }

        if let Some((encoding, _)) = Encoding::for_bom(bytes) {
            return EncodingGuess::new(encoding, 1.0);
        }

        if let Some(guess) = sniff_utf16(bytes) {
            return guess;
        }

        match std::str::from_utf8(bytes) {
            Ok(_) if bytes.is_ascii() => EncodingGuess::new(UTF_8, 1.0),
            Ok(_) => EncodingGuess::new(UTF_8, 0.99),
            Err(_) => EncodingGuess::new(WINDOWS_1252, 0.5),
        }
    }

    /// Detect, then decode
    pub fn decode(&self, bytes: &[u8]) -> DecodedText {
        let guess = self.resolve(bytes);
        self.decode_as(bytes, guess)
    }

    /// Decode with an already resolved guess, falling back to
    /// [`FALLBACK_ENCODING`] when the bytes are malformed for it
    pub fn decode_as(&self, bytes: &[u8], guess: EncodingGuess) -> DecodedText {
        let encoding = guess.encoding.unwrap_or(UTF_8);

        let body = match Encoding::for_bom(bytes) {
            Some((bom_encoding, bom_len)) if bom_encoding == encoding => &bytes[bom_len..],
            _ => bytes,
        };

        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(body) {
            debug!(
                encoding = %encoding.name(),
                confidence = guess.confidence,
                size = bytes.len(),
                "Decoded log text"
            );
            return DecodedText {
                text: text.into_owned(),
                encoding: encoding.name(),
                confidence: guess.confidence,
                fallback_used: false,
            };
        }

        warn!(
            encoding = %guess.name(),
            fallback = %FALLBACK_ENCODING.name(),
            size = bytes.len(),
            "Decoding failed, retrying with fallback encoding"
        );

        let (text, _had_errors) = FALLBACK_ENCODING.decode_without_bom_handling(body);
        DecodedText {
            text: text.into_owned(),
            encoding: FALLBACK_ENCODING.name(),
            confidence: guess.confidence,
            fallback_used: true,
        }
    }
}

/// UTF-16 without a BOM: mostly-ASCII text leaves a NUL in every other byte
fn sniff_utf16(bytes: &[u8]) -> Option<EncodingGuess> {
    let sample = &bytes[..bytes.len().min(SNIFF_LEN)];
    let pairs = sample.len() / 2;
    if pairs == 0 {
        return None;
    }

    let (mut even_nuls, mut odd_nuls) = (0usize, 0usize);
    for pair in sample.chunks_exact(2) {
        if pair[0] == 0 {
            even_nuls += 1;
        }
        if pair[1] == 0 {
            odd_nuls += 1;
        }
    }

    let even = even_nuls as f32 / pairs as f32;
    let odd = odd_nuls as f32 / pairs as f32;

    if odd >= UTF16_NUL_RATIO && even < UTF16_NUL_RATIO / 6.0 {
        Some(EncodingGuess::new(UTF_16LE, odd))
    } else if even >= UTF16_NUL_RATIO && odd < UTF16_NUL_RATIO / 6.0 {
        Some(EncodingGuess::new(UTF_16BE, even))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le(text: &str, bom: bool) -> Vec<u8> {
        let mut out = if bom { vec![0xFF, 0xFE] } else { Vec::new() };
        for unit in text.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_empty_input_is_unknown() {
        let guess = EncodingResolver::new().resolve(b"");
        assert_eq!(guess.name(), UNKNOWN_ENCODING);
        assert_eq!(guess.confidence, 0.0);
    }

    #[test]
    fn test_ascii_resolves_to_utf8() {
        let guess = EncodingResolver::new().resolve(b"2024-01-01 10:00:00.00 Server started");
        assert_eq!(guess.name(), "UTF-8");
        assert_eq!(guess.confidence, 1.0);
    }

    #[test]
    fn test_utf8_with_non_ascii() {
        let guess = EncodingResolver::new().resolve("Anmeldung für 'sa' fehlgeschlagen".as_bytes());
        assert_eq!(guess.name(), "UTF-8");
        assert!(guess.confidence < 1.0);
    }

    #[test]
    fn test_bom_detection() {
        let resolver = EncodingResolver::new();
        assert_eq!(resolver.resolve(&utf16le("ERRORLOG", true)).name(), "UTF-16LE");
        assert_eq!(resolver.resolve(b"\xEF\xBB\xBFhello").name(), "UTF-8");
    }

    #[test]
    fn test_utf16le_without_bom() {
        let guess = EncodingResolver::new().resolve(&utf16le("2024-01-01 Error: 18456, Severity: 14", false));
        assert_eq!(guess.name(), "UTF-16LE");
        assert!(guess.confidence > 0.9);
    }

    #[test]
    fn test_decode_utf16le_strips_bom() {
        let decoded = EncodingResolver::new().decode(&utf16le("Error: 1, Severity: 2", true));
        assert_eq!(decoded.text, "Error: 1, Severity: 2");
        assert_eq!(decoded.encoding, "UTF-16LE");
        assert!(!decoded.fallback_used);
    }

    #[test]
    fn test_latin1_bytes_decode_without_fallback() {
        let decoded = EncodingResolver::new().decode(b"caf\xe9 Error: 1, Severity: 2");
        assert_eq!(decoded.text, "café Error: 1, Severity: 2");
        assert_eq!(decoded.encoding, "windows-1252");
        assert!(!decoded.fallback_used);
    }

    #[test]
    fn test_malformed_bytes_use_fallback() {
        let resolver = EncodingResolver::new();
        let bytes = b"\xEF\xBB\xBF2024-01-01 10:00:00.123456 Error: 825, Severity: 17 \xff\xfe\xc3";
        let decoded = resolver.decode(bytes);

        assert!(decoded.fallback_used);
        assert_eq!(decoded.encoding, "windows-1252");
        assert!(decoded.text.contains("Error: 825, Severity: 17"));
    }

    #[test]
    fn test_forced_guess_falls_back() {
        let resolver = EncodingResolver::new();
        let decoded = resolver.decode_as(b"abc\x80\xff", EncodingGuess::new(UTF_8, 0.9));

        assert!(decoded.fallback_used);
        assert_eq!(decoded.confidence, 0.9);
        assert_eq!(decoded.text, "abc\u{20ac}\u{ff}");
    }

    #[test]
    fn test_odd_length_utf16_falls_back() {
        let mut bytes = utf16le("Error: 1, Severity: 2", false);
        bytes.push(b'x');
        let decoded = EncodingResolver::new().decode(&bytes);

        assert!(decoded.fallback_used);
        assert!(!decoded.text.is_empty());
    }

    #[test]
    fn test_decode_is_total() {
        let resolver = EncodingResolver::new();
        let mut state: u32 = 0x2545_F491;
        for len in 0..512usize {
            let bytes: Vec<u8> = (0..len)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    (state & 0xff) as u8
                })
                .collect();
            let decoded = resolver.decode(&bytes);
            let only_bom = Encoding::for_bom(&bytes).map(|(_, bom_len)| bom_len) == Some(bytes.len());
            if !bytes.is_empty() && !only_bom {
                assert!(!decoded.text.is_empty(), "empty text for {} bytes", len);
            }
        }
    }
}

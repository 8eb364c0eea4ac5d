// ── Identifier decoding ──
//
// Reader identifiers are hex-encoded bytes. Tags written by the labelling
// station carry printable ASCII, so the decoded text is what prefixes and
// reference keys are matched against.

/// Text standing in for an identifier that is not valid hex.
pub const DECODE_FAILURE: &str = "<decode-error>";

/// Result of decoding a hex identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Printable ASCII (32..=126) extracted from the bytes.
    Text(String),
    /// Odd length or a non-hex digit.
    Malformed,
}

impl Decoded {
    /// The decoded text, or [`DECODE_FAILURE`].
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Malformed => DECODE_FAILURE,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed)
    }
}

/// Decode hex pairs into bytes, keeping only printable ASCII.
///
/// Surrounding whitespace is ignored. Non-printable bytes are dropped.
pub fn decode_identifier(hex: &str) -> Decoded {
    let digits = hex.trim().as_bytes();
    if digits.len() % 2 != 0 {
        return Decoded::Malformed;
    }

    let mut text = String::with_capacity(digits.len() / 2);
    for pair in digits.chunks_exact(2) {
        let (Some(high), Some(low)) = (nibble(pair[0]), nibble(pair[1])) else {
            return Decoded::Malformed;
        };
        let byte = (high << 4) | low;
        if (32..=126).contains(&byte) {
            text.push(char::from(byte));
        }
    }
    Decoded::Text(text)
}

fn nibble(digit: u8) -> Option<u8> {
    char::from(digit)
        .to_digit(16)
        .and_then(|d| u8::try_from(d).ok())
}

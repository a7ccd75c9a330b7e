//! DTMF input handling
//!
//! Free text typed into the in-call keypad is reduced to the touch-tone
//! alphabet (`0-9`, `*`, `#`). Letters map to their keypad digit the way a
//! phone keypad prints them, everything else is dropped. None of this can
//! fail: invalid input degrades to omission.
//!
//! ```rust
//! use dialer_core::dtmf::sanitize_dtmf_input;
//!
//! assert_eq!(sanitize_dtmf_input("1-800-FLOWERS"), "18003569377");
//! ```

/// Maximum length of a dial string, E.164 numbers included
pub const MAX_DIAL_STRING_LEN: usize = 15;

/// Map one character to its DTMF digit
///
/// Digits, `*` and `#` pass through. ASCII letters (either case) map to the
/// keypad group they are printed on. Anything else yields `None`.
pub fn char_to_dtmf(c: char) -> Option<char> {
    match c.to_ascii_lowercase() {
        d @ ('0'..='9' | '*' | '#') => Some(d),
        'a' | 'b' | 'c' => Some('2'),
        'd' | 'e' | 'f' => Some('3'),
        'g' | 'h' | 'i' => Some('4'),
        'j' | 'k' | 'l' => Some('5'),
        'm' | 'n' | 'o' => Some('6'),
        'p' | 'q' | 'r' | 's' => Some('7'),
        't' | 'u' | 'v' => Some('8'),
        'w' | 'x' | 'y' | 'z' => Some('9'),
        _ => None,
    }
}

/// Reduce arbitrary text to a DTMF sequence, preserving order
pub fn sanitize_dtmf_input(text: &str) -> String {
    text.chars().filter_map(char_to_dtmf).collect()
}

/// Check a destination against the dial-string alphabet
///
/// Accepts digits, `*` and `#` with an optional leading `+`, up to
/// [`MAX_DIAL_STRING_LEN`] characters. The empty string is valid (a cleared
/// dialer).
pub fn is_valid_dial_string(value: &str) -> bool {
    if value.chars().count() > MAX_DIAL_STRING_LEN {
        return false;
    }
    let body = value.strip_prefix('+').unwrap_or(value);
    body.chars().all(|c| matches!(c, '0'..='9' | '*' | '#'))
}

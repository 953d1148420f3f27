//! Request-line tokenizing and URL percent/plus decoding.
//!
//! Grounded on `misc.c`'s `parse_string()` (tokenizer, with its
//! multi-delimiter and tail-preserving behavior) and `url.c`'s
//! `url_indecode()` (in-place percent decode with a no-op fast path).

use std::borrow::Cow;

pub const MAX_TOKENS: usize = 64;
pub const MAX_LINE_BYTES: usize = 65535;

/// Split `line` on runs of spaces, capping at `max_tokens`. `parse_string`'s
/// delimiter is space only; `+` is never a token boundary there (it is
/// `url_indecode`'s job, applied per token by [`url_decode`]). Once the cap
/// is reached the remaining text becomes the final token verbatim (matching
/// the original's "tail-preserving" last token), rather than being silently
/// dropped.
pub fn tokenize(line: &str, max_tokens: usize) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = line.trim_matches(' ');
    while !rest.is_empty() {
        if tokens.len() + 1 >= max_tokens {
            tokens.push(rest.to_string());
            break;
        }
        match rest.find(' ') {
            Some(pos) => {
                tokens.push(rest[..pos].to_string());
                rest = rest[pos..].trim_start_matches(' ');
            }
            None => {
                tokens.push(rest.to_string());
                break;
            }
        }
    }
    tokens
}

/// Decode `%HH` escapes and literal `+` into a space, in place where
/// possible. Returns the original slice unchanged (no allocation) when no
/// `%` is present, mirroring the original's pointer-equality fast path.
/// Decoded length never exceeds the encoded length.
pub fn url_decode(token: &str) -> Cow<'_, str> {
    if !token.contains('%') {
        if !token.contains('+') {
            return Cow::Borrowed(token);
        }
        return Cow::Owned(token.replace('+', " "));
    }

    let bytes = token.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|b| std::str::from_utf8(b).ok());
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Cow::Owned(String::from_utf8_lossy(&out).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_on_space_only() {
        // '+' is not a delimiter here; it stays embedded in the token and
        // is only turned into a space later, per-token, by url_decode.
        let tokens = tokenize("1 bob.example+foo", 64);
        assert_eq!(tokens, vec!["1", "bob.example+foo"]);
    }

    #[test]
    fn tokenize_preserves_tail_past_cap() {
        let tokens = tokenize("a b c d e", 3);
        assert_eq!(tokens, vec!["a", "b", "c d e"]);
    }

    #[test]
    fn url_decode_no_percent_is_borrowed() {
        let decoded = url_decode("plain-token");
        assert!(matches!(decoded, Cow::Borrowed(_)));
        assert_eq!(decoded, "plain-token");
    }

    #[test]
    fn url_decode_percent_hex_and_plus() {
        assert_eq!(url_decode("a%20b+c"), "a b c");
        assert_eq!(url_decode("100%25"), "100%");
    }

    #[test]
    fn url_decode_trailing_malformed_percent_is_kept_literal() {
        assert_eq!(url_decode("bad%2"), "bad%2");
        assert_eq!(url_decode("bad%"), "bad%");
    }
}

//! Decoding of a single keystroke token.
//!
//! A token looks like `<digits><marker><char>`, optionally followed by more
//! of the same: `12+a13+b` is two entries. The digits are the offset of the
//! character from the start of its word, the marker says whether the key moved
//! the cursor forward (`+`, `$`) or was a correction (`-`). A backslash after
//! the marker escapes the next character so delimiters can appear as payload.

use crate::error::DecodeError;
use log::warn;

pub const ESCAPE: char = '\\';

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Marker {
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "$")]
    Dollar,
    #[strum(serialize = "-")]
    Minus,
}

impl Marker {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Marker::Plus),
            '$' => Some(Marker::Dollar),
            '-' => Some(Marker::Minus),
            _ => None,
        }
    }

    pub fn is_marker(c: char) -> bool {
        Self::from_char(c).is_some()
    }

    pub fn forward(self) -> bool {
        !matches!(self, Marker::Minus)
    }
}

/// One decoded character of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub ch: char,
    /// Offset of `ch` relative to the word index of the enclosing group.
    pub offset: i64,
    pub forward: bool,
}

impl Entry {
    pub fn new(ch: char, offset: i64, forward: bool) -> Self {
        Self { ch, offset, forward }
    }

    /// Encode back into token form. Backslashes are escaped so the result
    /// decodes to the same entry.
    pub fn encode(&self) -> String {
        let marker = if self.forward { Marker::Plus } else { Marker::Minus };
        if self.ch == ESCAPE {
            format!("{}{}{}{}", self.offset, marker, ESCAPE, self.ch)
        } else {
            format!("{}{}{}", self.offset, marker, self.ch)
        }
    }
}

/// Lazily walks a token, yielding one entry per encoded character.
///
/// Unknown markers are logged and skipped together with the character slot
/// that follows them. A bad digit run yields one `Err` and ends iteration.
#[derive(Debug, Clone)]
pub struct TokenEntries<'a> {
    token: &'a str,
    pos: usize,
    done: bool,
}

impl<'a> TokenEntries<'a> {
    pub fn new(token: &'a str) -> Self {
        Self::from_position(token, 0)
    }

    /// Start decoding at byte offset `pos`. Offsets past the end, or not on a
    /// char boundary, yield nothing.
    pub fn from_position(token: &'a str, pos: usize) -> Self {
        Self {
            token,
            pos,
            done: !token.is_char_boundary(pos),
        }
    }

    /// Byte offset where the next entry will be read from.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl<'a> Iterator for TokenEntries<'a> {
    type Item = Result<Entry, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let rest = &self.token[self.pos..];
            let Some((marker_at, marker)) = rest.char_indices().find(|(_, c)| !c.is_ascii_digit())
            else {
                self.done = true;
                return None;
            };

            let offset: i64 = match rest[..marker_at].parse() {
                Ok(n) => n,
                Err(_) => {
                    self.done = true;
                    return Some(Err(DecodeError::InvalidNumber {
                        token: self.token.to_string(),
                    }));
                }
            };

            let mut chars = rest[marker_at + marker.len_utf8()..].char_indices();
            let slot = match chars.next() {
                Some((_, ESCAPE)) => chars.next(),
                other => other,
            };
            let Some((ch_at, ch)) = slot else {
                self.done = true;
                return None;
            };
            let consumed = marker_at + marker.len_utf8() + ch_at + ch.len_utf8();
            self.pos += consumed;
            if self.pos >= self.token.len() {
                self.done = true;
            }

            match Marker::from_char(marker) {
                Some(m) => return Some(Ok(Entry::new(ch, offset, m.forward()))),
                None => warn!(
                    "unrecognized marker '{}' in token '{}', skipping",
                    marker, self.token
                ),
            }
        }
        None
    }
}

/// Decode every entry of `token`, failing on the first bad digit run.
pub fn decode_token(token: &str) -> Result<Vec<Entry>, DecodeError> {
    TokenEntries::new(token).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plus_and_dollar_are_forward() {
        assert_eq!(decode_token("3+a").unwrap(), vec![Entry::new('a', 3, true)]);
        assert_eq!(decode_token("7$z").unwrap(), vec![Entry::new('z', 7, true)]);
    }

    #[test]
    fn test_minus_is_correction() {
        assert_eq!(decode_token("12-q").unwrap(), vec![Entry::new('q', 12, false)]);
    }

    #[test]
    fn test_empty_and_markerless_tokens() {
        assert!(decode_token("").unwrap().is_empty());
        assert!(decode_token("123").unwrap().is_empty());
    }

    #[test]
    fn test_marker_as_last_character() {
        assert!(decode_token("4+").unwrap().is_empty());
        assert_eq!(decode_token("0+a5-").unwrap(), vec![Entry::new('a', 0, true)]);
    }

    #[test]
    fn test_escape_consumes_one_position() {
        assert_eq!(decode_token("2+\\,").unwrap(), vec![Entry::new(',', 2, true)]);
        assert_eq!(
            decode_token("2+\\|3-x").unwrap(),
            vec![Entry::new('|', 2, true), Entry::new('x', 3, false)]
        );
        // an escaped backslash is the literal backslash
        assert_eq!(decode_token("1+\\\\").unwrap(), vec![Entry::new('\\', 1, true)]);
    }

    #[test]
    fn test_trailing_escape_yields_nothing() {
        assert!(decode_token("1+\\").unwrap().is_empty());
    }

    #[test]
    fn test_multiple_entries_in_one_token() {
        assert_eq!(
            decode_token("0+h1+e2-x").unwrap(),
            vec![
                Entry::new('h', 0, true),
                Entry::new('e', 1, true),
                Entry::new('x', 2, false)
            ]
        );
    }

    #[test]
    fn test_unrecognized_marker_skips_its_slot() {
        assert_eq!(
            decode_token("0*a1+b").unwrap(),
            vec![Entry::new('b', 1, true)]
        );
        assert!(decode_token("0*a").unwrap().is_empty());
    }

    #[test]
    fn test_missing_digits_is_fatal() {
        assert_eq!(
            decode_token("+a"),
            Err(DecodeError::InvalidNumber {
                token: "+a".to_string()
            })
        );
        let mut it = TokenEntries::new("0+a+b");
        assert!(it.next().unwrap().is_ok());
        assert!(it.next().unwrap().is_err());
        assert!(it.next().is_none());
    }

    #[test]
    fn test_multibyte_characters() {
        assert_eq!(
            decode_token("0+é1-ü").unwrap(),
            vec![Entry::new('é', 0, true), Entry::new('ü', 1, false)]
        );
    }

    #[test]
    fn test_restart_from_position() {
        let mut it = TokenEntries::new("0+a1+b");
        it.next();
        let resumed: Vec<_> = TokenEntries::from_position("0+a1+b", it.position())
            .map(Result::unwrap)
            .collect();
        assert_eq!(resumed, vec![Entry::new('b', 1, true)]);
    }

    #[test]
    fn test_reencoded_entries_decode_identically() {
        let entries = vec![
            Entry::new('t', 0, true),
            Entry::new('x', 1, false),
            Entry::new('\\', 2, true),
            Entry::new('e', 11, true),
        ];
        let encoded: String = entries.iter().map(Entry::encode).collect();
        assert_eq!(decode_token(&encoded).unwrap(), entries);
    }

    #[test]
    fn test_marker_display() {
        assert_eq!(Marker::Dollar.to_string(), "$");
        assert!(Marker::is_marker('-'));
        assert!(!Marker::is_marker('*'));
    }
}

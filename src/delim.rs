//! Splitting on delimiters that may also appear escaped inside tokens.
//!
//! A delimiter directly preceded by `<digit><marker>` is the payload
//! character of a token, not a separator.

use crate::token::Marker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    AfterDigit,
    AfterMarker,
}

impl State {
    fn step(self, c: char) -> State {
        if c.is_ascii_digit() {
            State::AfterDigit
        } else if self == State::AfterDigit && Marker::is_marker(c) {
            State::AfterMarker
        } else {
            State::Normal
        }
    }
}

/// Split `s` on every unescaped `delim`. Always returns at least one piece.
pub fn split_unescaped(s: &str, delim: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut state = State::Normal;

    for (i, c) in s.char_indices() {
        if c == delim && state != State::AfterMarker {
            pieces.push(&s[start..i]);
            start = i + c.len_utf8();
            state = State::Normal;
        } else {
            state = state.step(c);
        }
    }
    pieces.push(&s[start..]);
    pieces
}

/// Everything after the last unescaped `delim`, or all of `s` if there is none.
pub fn last_segment(s: &str, delim: char) -> &str {
    split_unescaped(s, delim).pop().unwrap_or(s)
}

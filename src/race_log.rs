use crate::delim::{last_segment, split_unescaped};
use crate::error::DecodeError;
use crate::token::decode_token;
use chrono::NaiveDateTime;
use itertools::Itertools;
use serde::Serialize;

/// One decoded keystroke of a race, in replay order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Keystroke {
    pub seq_index: usize,
    /// Position of `ch` in the race text; -1 for the sentinel.
    pub ch_index: i64,
    /// Empty only for the sentinel.
    pub ch: String,
    pub ms: i64,
    pub forward: bool,
}

impl Keystroke {
    /// The synthetic "start of race" entry at `seq_index` 0.
    pub fn sentinel() -> Self {
        Self {
            seq_index: 0,
            ch_index: -1,
            ch: String::new(),
            ms: 0,
            forward: true,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.seq_index == 0
    }
}

/// A pair of consecutive keystrokes, keyed by the later one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub ch_prev: String,
    pub ch: String,
    pub ms: i64,
    pub forward_prev: bool,
    pub forward: bool,
    pub ch_index: i64,
    pub seq_index: usize,
}

/// A fully decoded race, tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceLog {
    pub text_id: i64,
    pub user_id: i64,
    pub race_id: i64,
    pub race_date: NaiveDateTime,
    pub keystrokes: Vec<Keystroke>,
}

impl RaceLog {
    pub fn transitions(&self) -> Vec<Transition> {
        transitions(&self.keystrokes)
    }
}

fn parse_number(field: &str) -> Result<i64, DecodeError> {
    field
        .trim()
        .parse()
        .map_err(|_| DecodeError::InvalidNumber {
            token: field.to_string(),
        })
}

fn next_field<'a, I>(fields: &mut I, expected: &'static str) -> Result<&'a str, DecodeError>
where
    I: Iterator<Item = &'a str>,
{
    fields.next().ok_or(DecodeError::Truncated { expected })
}

/// Decode the raw `typingLog` payload of one race.
///
/// The payload is the part after the last unescaped `|`, a comma separated
/// stream of groups: `word_index, n, (ms, token) * n`. Each token's duration
/// is split evenly across the characters it decodes to, dropping the
/// remainder. The first keystroke is always the sentinel.
pub fn decode_race_log(raw: &str) -> Result<Vec<Keystroke>, DecodeError> {
    let mut keystrokes = vec![Keystroke::sentinel()];

    let payload = last_segment(raw, '|');
    if payload.is_empty() {
        return Ok(keystrokes);
    }

    let mut fields = split_unescaped(payload, ',').into_iter();
    while let Some(word) = fields.next() {
        let word_index = parse_number(word)?;
        let length = parse_number(next_field(&mut fields, "group length")?)?;

        for _ in 0..length {
            let ms = parse_number(next_field(&mut fields, "duration")?)?;
            let token = next_field(&mut fields, "token")?;
            let entries = decode_token(token)?;
            if entries.is_empty() {
                continue;
            }
            let share = ms.div_euclid(entries.len() as i64);
            for entry in entries {
                let ch_index = word_index.checked_add(entry.offset).ok_or_else(|| {
                    DecodeError::InvalidNumber {
                        token: token.to_string(),
                    }
                })?;
                keystrokes.push(Keystroke {
                    seq_index: keystrokes.len(),
                    ch_index,
                    ch: entry.ch.to_string(),
                    ms: share,
                    forward: entry.forward,
                });
            }
        }
    }

    Ok(keystrokes)
}

/// Pair every keystroke with the one whose `seq_index` is exactly one lower.
pub fn transitions(keystrokes: &[Keystroke]) -> Vec<Transition> {
    keystrokes
        .iter()
        .tuple_windows()
        .filter(|(prev, cur)| cur.seq_index == prev.seq_index + 1)
        .map(|(prev, cur)| Transition {
            ch_prev: prev.ch.clone(),
            ch: cur.ch.clone(),
            ms: cur.ms,
            forward_prev: prev.forward,
            forward: cur.forward,
            ch_index: cur.ch_index,
            seq_index: cur.seq_index,
        })
        .collect()
}

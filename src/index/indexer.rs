//! # Matching-Rule Indexers
//!
//! Pure key-generation functions: attribute values in, index keys out.
//! Dispatch is a closed enum ([`IndexType`]) with a factory function, not
//! dynamic loading; adding a matching rule means adding a variant here.
//!
//! ## Key Spaces
//!
//! - **Presence**: the single marker key `+`.
//! - **Equality**: the normalized value bytes. The ordering rule shares
//!   this key space: range queries iterate equality keys in sorted order
//!   instead of maintaining a second tree.
//! - **Substring**: for each start position, the chunk of up to N bytes
//!   (default 6). The value `ABCDE` with N=3 yields `ABC BCD CDE DE E`,
//!   so a filter fragment shorter than N is a prefix of stored keys
//!   (looked up by prefix range) and a longer fragment is covered by
//!   intersecting its N-sized windows. N is part of the index identity
//!   (`substring.<N>`).
//! - **Approximate**: a phonetic code per word: consonant classes after
//!   the initial letter, vowels and repeats dropped, truncated to four
//!   characters (Soundex-style folding).

use crate::dn::normalize_value;
use std::fmt;

pub const PRESENCE_KEY: &[u8] = b"+";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexType {
    Presence,
    Equality,
    Substring,
    Ordering,
    Approximate,
}

impl IndexType {
    pub const ALL: [IndexType; 5] = [
        IndexType::Presence,
        IndexType::Equality,
        IndexType::Substring,
        IndexType::Ordering,
        IndexType::Approximate,
    ];

    /// The index identity suffix used in tree names
    /// (`<prefix>_<attr>.<index_id>`). Ordering deliberately maps onto the
    /// equality index id: both rules share one key space and one tree.
    pub fn index_id(self, substring_length: usize) -> String {
        match self {
            IndexType::Presence => "presence".to_string(),
            IndexType::Equality | IndexType::Ordering => "equality".to_string(),
            IndexType::Substring => format!("substring.{}", substring_length),
            IndexType::Approximate => "approximate".to_string(),
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexType::Presence => "presence",
            IndexType::Equality => "equality",
            IndexType::Substring => "substring",
            IndexType::Ordering => "ordering",
            IndexType::Approximate => "approximate",
        };
        write!(f, "{}", s)
    }
}

/// All keys the given index type derives from one attribute's values.
/// Deterministic: output is sorted and deduplicated.
pub fn keys_for(ty: IndexType, values: &[String], substring_length: usize) -> Vec<Vec<u8>> {
    let mut keys = match ty {
        IndexType::Presence => {
            if values.is_empty() {
                Vec::new()
            } else {
                vec![PRESENCE_KEY.to_vec()]
            }
        }
        IndexType::Equality | IndexType::Ordering => {
            values.iter().map(|v| equality_key(v)).collect()
        }
        IndexType::Substring => {
            let mut out = Vec::new();
            for v in values {
                substring_keys(v, substring_length, &mut out);
            }
            out
        }
        IndexType::Approximate => {
            let mut out = Vec::new();
            for v in values {
                for word in normalize_value(v).split(' ') {
                    if !word.is_empty() {
                        out.push(phonetic_code(word).into_bytes());
                    }
                }
            }
            out
        }
    };
    keys.sort_unstable();
    keys.dedup();
    keys
}

pub fn equality_key(value: &str) -> Vec<u8> {
    normalize_value(value).into_bytes()
}

/// Chunk keys for one value, appended to `out`.
pub fn substring_keys(value: &str, length: usize, out: &mut Vec<Vec<u8>>) {
    let bytes = normalize_value(value).into_bytes();
    for start in 0..bytes.len() {
        let end = (start + length).min(bytes.len());
        out.push(bytes[start..end].to_vec());
    }
}

/// Keys a substring *assertion* fragment needs looked up: the fragment
/// itself when it fits in one chunk, otherwise every N-sized window of it.
pub fn substring_assertion_keys(fragment: &str, length: usize) -> Vec<Vec<u8>> {
    let bytes = normalize_value(fragment).into_bytes();
    let mut out = Vec::new();
    if bytes.is_empty() {
        return out;
    }
    if bytes.len() <= length {
        out.push(bytes);
    } else {
        for start in 0..=bytes.len() - length {
            out.push(bytes[start..start + length].to_vec());
        }
    }
    out.sort_unstable();
    out.dedup();
    out
}

/// Soundex-style phonetic folding of one lowercase word.
pub fn phonetic_code(word: &str) -> String {
    fn class(c: u8) -> Option<u8> {
        match c {
            b'b' | b'f' | b'p' | b'v' => Some(b'1'),
            b'c' | b'g' | b'j' | b'k' | b'q' | b's' | b'x' | b'z' => Some(b'2'),
            b'd' | b't' => Some(b'3'),
            b'l' => Some(b'4'),
            b'm' | b'n' => Some(b'5'),
            b'r' => Some(b'6'),
            _ => None,
        }
    }

    let letters: Vec<u8> = word
        .bytes()
        .filter(|b| b.is_ascii_alphabetic())
        .map(|b| b.to_ascii_lowercase())
        .collect();
    let Some(&first) = letters.first() else {
        return String::new();
    };

    let mut code = vec![first.to_ascii_uppercase()];
    let mut prev = class(first);
    for &c in &letters[1..] {
        let cls = class(c);
        if let Some(digit) = cls {
            if prev != Some(digit) {
                code.push(digit);
                if code.len() == 4 {
                    break;
                }
            }
        }
        // 'h' and 'w' are transparent: they do not break a run
        if !matches!(c, b'h' | b'w') {
            prev = cls;
        }
    }
    while code.len() < 4 {
        code.push(b'0');
    }
    String::from_utf8(code).unwrap_or_default()
}

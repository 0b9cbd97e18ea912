//! # Distinguished Names
//!
//! DN parsing, normalization, hierarchy operations, and the byte-comparable
//! DN key encoding used by the DN-to-ID tree.
//!
//! ## Normalization
//!
//! Attribute types are lowercased. Attribute values keep their user-visible
//! form for display, and a normalized form (trimmed, internal whitespace
//! collapsed, lowercased) for comparison, hashing, and key generation. Two
//! DNs are equal when their normalized forms are equal.
//!
//! ## Key Encoding
//!
//! DN keys must place every entry immediately after its ancestors so that a
//! subtree is one contiguous key range. Components are emitted root-most
//! first, each preceded by a `0x00` separator; `0x00` and `0x01` bytes
//! inside a component are escaped as `0x01 0x00` / `0x01 0x01`:
//!
//! ```text
//! dc=test,dc=com      -> 00 "dc=com" 00 "dc=test"
//! ou=p,dc=test,dc=com -> 00 "dc=com" 00 "dc=test" 00 "ou=p"
//! ```
//!
//! The strict-descendant range of a DN with key `K` is `[K ++ 00, K ++ 01)`,
//! and children are the keys in that range with exactly one more separator.

use eyre::{bail, ensure, Result};
use std::fmt;
use std::hash::{Hash, Hasher};

const KEY_SEPARATOR: u8 = 0x00;
const KEY_ESCAPE: u8 = 0x01;

/// A single attribute-value assertion naming one level of the tree.
/// Multi-valued RDNs are not supported.
#[derive(Debug, Clone)]
pub struct Rdn {
    attr: String,
    value: String,
    norm_value: String,
}

impl Rdn {
    pub fn new(attr: &str, value: &str) -> Rdn {
        Rdn {
            attr: attr.trim().to_ascii_lowercase(),
            value: value.trim().to_string(),
            norm_value: normalize_value(value),
        }
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn norm_value(&self) -> &str {
        &self.norm_value
    }

    fn normalized(&self) -> String {
        format!("{}={}", self.attr, self.norm_value)
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.attr == other.attr && self.norm_value == other.norm_value
    }
}

impl Eq for Rdn {}

impl Hash for Rdn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.attr.hash(state);
        self.norm_value.hash(state);
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attr, escape_value(&self.value))
    }
}

/// A distinguished name: a sequence of RDNs, leaf-most first. The empty
/// sequence is the root DN.
#[derive(Debug, Clone, Eq)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    pub fn root() -> Dn {
        Dn { rdns: Vec::new() }
    }

    pub fn parse(s: &str) -> Result<Dn> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Dn::root());
        }
        let mut rdns = Vec::new();
        for component in split_unescaped(s, ',')? {
            rdns.push(parse_rdn(&component)?);
        }
        Ok(Dn { rdns })
    }

    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    pub fn num_components(&self) -> usize {
        self.rdns.len()
    }

    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            return None;
        }
        Some(Dn {
            rdns: self.rdns[1..].to_vec(),
        })
    }

    /// All proper ancestors, nearest first, excluding the root DN.
    pub fn ancestors(&self) -> impl Iterator<Item = Dn> + '_ {
        (1..self.rdns.len()).map(|i| Dn {
            rdns: self.rdns[i..].to_vec(),
        })
    }

    /// True when `self` is strictly below `other`.
    pub fn is_descendant_of(&self, other: &Dn) -> bool {
        let n = other.rdns.len();
        self.rdns.len() > n && self.rdns[self.rdns.len() - n..] == other.rdns[..]
    }

    pub fn is_subordinate_or_equal(&self, other: &Dn) -> bool {
        self == other || self.is_descendant_of(other)
    }

    /// Rewrites the suffix of a descendant DN when its ancestor moves:
    /// `self` must be subordinate to (or equal to) `old_base`.
    pub fn rebase(&self, old_base: &Dn, new_base: &Dn) -> Result<Dn> {
        ensure!(
            self.is_subordinate_or_equal(old_base),
            "{} is not subordinate to {}",
            self,
            old_base
        );
        let keep = self.rdns.len() - old_base.rdns.len();
        let mut rdns = self.rdns[..keep].to_vec();
        rdns.extend_from_slice(&new_base.rdns);
        Ok(Dn { rdns })
    }

    /// Appends a child RDN, producing a DN one level below `self`.
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend_from_slice(&self.rdns);
        Dn { rdns }
    }

    pub fn normalized(&self) -> String {
        let parts: Vec<String> = self.rdns.iter().map(|r| r.normalized()).collect();
        parts.join(",")
    }

    /// The byte-comparable key encoding described in the module docs.
    pub fn key(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for rdn in self.rdns.iter().rev() {
            out.push(KEY_SEPARATOR);
            for &b in rdn.normalized().as_bytes() {
                if b == KEY_SEPARATOR || b == KEY_ESCAPE {
                    out.push(KEY_ESCAPE);
                }
                out.push(b);
            }
        }
        out
    }

    /// Half-open key range covering the strict descendants of `self`.
    pub fn subtree_range(&self) -> (Vec<u8>, Vec<u8>) {
        let key = self.key();
        let mut lower = key.clone();
        lower.push(KEY_SEPARATOR);
        let mut upper = key;
        upper.push(KEY_ESCAPE);
        (lower, upper)
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.rdns == other.rdns
    }
}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rdns.hash(state);
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.rdns.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Number of DN components encoded in a DN key.
pub fn key_components(key: &[u8]) -> usize {
    let mut count = 0;
    let mut i = 0;
    while i < key.len() {
        match key[i] {
            KEY_ESCAPE => i += 2,
            KEY_SEPARATOR => {
                count += 1;
                i += 1;
            }
            _ => i += 1,
        }
    }
    count
}

/// Collapses runs of whitespace, trims, and lowercases a directory-string
/// value. Shared by DN normalization and the equality/ordering indexer.
pub fn normalize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_space = true;
    for c in value.trim().chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            for lc in c.to_lowercase() {
                out.push(lc);
            }
            last_space = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '=' | '+' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn split_unescaped(s: &str, sep: char) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => {
                    current.push(next);
                }
                None => bail!("dangling escape at end of '{}'", s),
            }
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else if c == '+' && sep == ',' {
            bail!("multi-valued RDNs are not supported: '{}'", s);
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    Ok(parts)
}

fn parse_rdn(component: &str) -> Result<Rdn> {
    let mut attr = String::new();
    let mut value = String::new();
    let mut seen_eq = false;
    let mut chars = component.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let Some(next) = chars.next() else {
                bail!("dangling escape in RDN '{}'", component);
            };
            if seen_eq {
                value.push(next);
            } else {
                attr.push(next);
            }
        } else if c == '=' && !seen_eq {
            seen_eq = true;
        } else if seen_eq {
            value.push(c);
        } else {
            attr.push(c);
        }
    }
    ensure!(seen_eq, "RDN '{}' has no '='", component);
    let attr = attr.trim();
    let value = value.trim();
    ensure!(!attr.is_empty(), "RDN '{}' has an empty attribute", component);
    ensure!(!value.is_empty(), "RDN '{}' has an empty value", component);
    ensure!(
        attr.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ';'),
        "RDN attribute '{}' contains invalid characters",
        attr
    );
    Ok(Rdn::new(attr, value))
}

//! # Directory Entries and Modifications
//!
//! The entry model stored by the container: a DN plus an attribute map.
//! Object classes are the values of the `objectclass` attribute; referral
//! entries (`objectclass: referral`) additionally carry `ref` URIs.
//!
//! Entries are immutable once constructed. Changing an entry produces a new
//! `Entry` via [`Entry::apply_modifications`] or the builder-style setters;
//! the container stores a serialized copy, never the caller's instance.
//!
//! ## Serialization Format
//!
//! ```text
//! [varint dn-len][dn bytes]
//! [varint attr-count]
//!   per attribute:
//!     [varint name-len][name bytes]
//!     [varint value-count]
//!       per value: [varint len][bytes]
//! ```
//!
//! Attribute names are stored lowercased; the map is ordered, so encoding
//! is deterministic and byte-equal entries are semantically equal.

use crate::dn::{normalize_value, Dn};
use crate::encoding::{read_str, read_varint, write_str, write_varint};
use crate::error::OperationError;
use eyre::{ensure, Result};
use std::collections::BTreeMap;
use std::fmt;

pub const OBJECTCLASS_ATTR: &str = "objectclass";
pub const REFERRAL_CLASS: &str = "referral";
pub const REFERRAL_URI_ATTR: &str = "ref";

/// A 64-bit entry identifier, monotonically allocated per container.
/// Big-endian key encoding keeps ID order equal to byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub u64);

impl EntryId {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_key(key: &[u8]) -> Result<EntryId> {
        ensure!(
            key.len() == 8,
            "entry ID key must be 8 bytes, got {}",
            key.len()
        );
        let mut be = [0u8; 8];
        be.copy_from_slice(key);
        Ok(EntryId(u64::from_be_bytes(be)))
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    dn: Dn,
    attrs: BTreeMap<String, Vec<String>>,
}

impl Entry {
    pub fn new(dn: Dn) -> Entry {
        Entry {
            dn,
            attrs: BTreeMap::new(),
        }
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    /// Clone with a different DN; used when a rename moves a subtree.
    pub fn with_dn(&self, dn: Dn) -> Entry {
        Entry {
            dn,
            attrs: self.attrs.clone(),
        }
    }

    pub fn with_attribute<S: Into<String>>(mut self, attr: &str, values: Vec<S>) -> Entry {
        let slot = self.attrs.entry(attr.to_ascii_lowercase()).or_default();
        for v in values {
            let v = v.into();
            let norm = normalize_value(&v);
            if !slot.iter().any(|have| normalize_value(have) == norm) {
                slot.push(v);
            }
        }
        self
    }

    pub fn attribute(&self, attr: &str) -> Option<&[String]> {
        self.attrs
            .get(&attr.to_ascii_lowercase())
            .map(|v| v.as_slice())
    }

    pub fn has_attribute(&self, attr: &str) -> bool {
        self.attrs.contains_key(&attr.to_ascii_lowercase())
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(|s| s.as_str())
    }

    pub fn object_classes(&self) -> &[String] {
        self.attribute(OBJECTCLASS_ATTR).unwrap_or(&[])
    }

    pub fn has_object_class(&self, class: &str) -> bool {
        self.object_classes()
            .iter()
            .any(|c| c.eq_ignore_ascii_case(class))
    }

    pub fn is_referral(&self) -> bool {
        self.has_object_class(REFERRAL_CLASS)
    }

    pub fn referral_uris(&self) -> &[String] {
        self.attribute(REFERRAL_URI_ATTR).unwrap_or(&[])
    }

    /// Normalized value comparison for one attribute against a candidate.
    pub fn has_value(&self, attr: &str, value: &str) -> bool {
        let norm = normalize_value(value);
        self.attribute(attr)
            .map(|vals| vals.iter().any(|v| normalize_value(v) == norm))
            .unwrap_or(false)
    }

    /// Applies a modification list, producing a new entry. The receiver is
    /// untouched; a failed modification leaves no partial result.
    pub fn apply_modifications(&self, mods: &[Modification]) -> Result<Entry, OperationError> {
        let mut attrs = self.attrs.clone();
        for m in mods {
            match m {
                Modification::Add { attr, values } => {
                    let attr = attr.to_ascii_lowercase();
                    let slot = attrs.entry(attr.clone()).or_default();
                    for v in values {
                        let norm = normalize_value(v);
                        if slot.iter().any(|e| normalize_value(e) == norm) {
                            return Err(OperationError::ConstraintViolation(format!(
                                "attribute '{}' already has value '{}'",
                                attr, v
                            )));
                        }
                        slot.push(v.clone());
                    }
                }
                Modification::Delete { attr, values } => {
                    let attr = attr.to_ascii_lowercase();
                    let Some(slot) = attrs.get_mut(&attr) else {
                        return Err(OperationError::ConstraintViolation(format!(
                            "attribute '{}' does not exist",
                            attr
                        )));
                    };
                    if values.is_empty() {
                        attrs.remove(&attr);
                        continue;
                    }
                    for v in values {
                        let norm = normalize_value(v);
                        let before = slot.len();
                        slot.retain(|e| normalize_value(e) != norm);
                        if slot.len() == before {
                            return Err(OperationError::ConstraintViolation(format!(
                                "attribute '{}' has no value '{}'",
                                attr, v
                            )));
                        }
                    }
                    if slot.is_empty() {
                        attrs.remove(&attr);
                    }
                }
                Modification::Replace { attr, values } => {
                    let attr = attr.to_ascii_lowercase();
                    if values.is_empty() {
                        attrs.remove(&attr);
                    } else {
                        attrs.insert(attr, values.clone());
                    }
                }
            }
        }
        Ok(Entry {
            dn: self.dn.clone(),
            attrs,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_str(&mut buf, &self.dn.to_string());
        write_varint(&mut buf, self.attrs.len() as u64);
        for (name, values) in &self.attrs {
            write_str(&mut buf, name);
            write_varint(&mut buf, values.len() as u64);
            for v in values {
                write_str(&mut buf, v);
            }
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Entry> {
        let mut pos = 0;
        let dn = Dn::parse(&read_str(buf, &mut pos)?)?;
        let attr_count = read_varint(buf, &mut pos)?;
        let mut attrs = BTreeMap::new();
        for _ in 0..attr_count {
            let name = read_str(buf, &mut pos)?;
            let value_count = read_varint(buf, &mut pos)?;
            let mut values = Vec::with_capacity(value_count as usize);
            for _ in 0..value_count {
                values.push(read_str(buf, &mut pos)?);
            }
            attrs.insert(name, values);
        }
        ensure!(pos == buf.len(), "trailing bytes after entry record");
        Ok(Entry { dn, attrs })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    Add { attr: String, values: Vec<String> },
    /// Empty `values` deletes the whole attribute.
    Delete { attr: String, values: Vec<String> },
    /// Empty `values` removes the attribute; otherwise the value set is
    /// replaced wholesale.
    Replace { attr: String, values: Vec<String> },
}

impl Modification {
    pub fn add(attr: &str, values: &[&str]) -> Modification {
        Modification::Add {
            attr: attr.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn delete(attr: &str, values: &[&str]) -> Modification {
        Modification::Delete {
            attr: attr.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn replace(attr: &str, values: &[&str]) -> Modification {
        Modification::Replace {
            attr: attr.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn attr(&self) -> &str {
        match self {
            Modification::Add { attr, .. }
            | Modification::Delete { attr, .. }
            | Modification::Replace { attr, .. } => attr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(dn: &str) -> Entry {
        Entry::new(Dn::parse(dn).unwrap())
            .with_attribute("objectClass", vec!["top", "person"])
            .with_attribute("cn", vec!["Aaccf Amar"])
            .with_attribute("sn", vec!["Amar"])
    }

    #[test]
    fn attribute_access_is_case_insensitive() {
        let e = person("uid=user.0,ou=People,dc=test,dc=com");
        assert_eq!(e.attribute("CN").unwrap(), &["Aaccf Amar"]);
        assert!(e.has_object_class("PERSON"));
        assert!(!e.is_referral());
    }

    #[test]
    fn builder_drops_duplicate_values() {
        let e = person("uid=u,dc=test,dc=com")
            .with_attribute("cn", vec!["AACCF  AMAR", "Aaccf Amar", "Other"]);
        assert_eq!(e.attribute("cn").unwrap(), &["Aaccf Amar", "Other"]);
    }

    #[test]
    fn encode_decode_round_trip() {
        let e = person("uid=user.0,ou=People,dc=test,dc=com");
        let decoded = Entry::decode(&e.encode()).unwrap();
        assert_eq!(decoded, e);
        assert_eq!(decoded.dn(), e.dn());
    }

    #[test]
    fn add_modification() {
        let e = person("uid=u,dc=test,dc=com");
        let out = e
            .apply_modifications(&[Modification::add("mail", &["u@test.com"])])
            .unwrap();
        assert_eq!(out.attribute("mail").unwrap(), &["u@test.com"]);
        assert!(!e.has_attribute("mail"));
    }

    #[test]
    fn add_duplicate_value_fails() {
        let e = person("uid=u,dc=test,dc=com");
        let err = e
            .apply_modifications(&[Modification::add("cn", &["AACCF  AMAR"])])
            .unwrap_err();
        assert!(matches!(err, OperationError::ConstraintViolation(_)));
    }

    #[test]
    fn delete_value_and_whole_attribute() {
        let e = person("uid=u,dc=test,dc=com").with_attribute("mail", vec!["a@x", "b@x"]);
        let out = e
            .apply_modifications(&[Modification::delete("mail", &["a@x"])])
            .unwrap();
        assert_eq!(out.attribute("mail").unwrap(), &["b@x"]);

        let out = out
            .apply_modifications(&[Modification::delete("mail", &[])])
            .unwrap();
        assert!(!out.has_attribute("mail"));
    }

    #[test]
    fn delete_missing_value_fails() {
        let e = person("uid=u,dc=test,dc=com");
        assert!(e
            .apply_modifications(&[Modification::delete("cn", &["nobody"])])
            .is_err());
        assert!(e
            .apply_modifications(&[Modification::delete("mail", &[])])
            .is_err());
    }

    #[test]
    fn replace_swaps_value_set() {
        let e = person("uid=u,dc=test,dc=com");
        let out = e
            .apply_modifications(&[Modification::replace("cn", &["New Name"])])
            .unwrap();
        assert_eq!(out.attribute("cn").unwrap(), &["New Name"]);

        let out = out
            .apply_modifications(&[Modification::replace("sn", &[])])
            .unwrap();
        assert!(!out.has_attribute("sn"));
    }

    #[test]
    fn referral_entries() {
        let e = Entry::new(Dn::parse("ou=ref,dc=test,dc=com").unwrap())
            .with_attribute("objectclass", vec!["referral", "extensibleObject"])
            .with_attribute("ref", vec!["ldap://other.example.com/dc=test,dc=com"]);
        assert!(e.is_referral());
        assert_eq!(e.referral_uris().len(), 1);
    }

    #[test]
    fn entry_id_key_order_matches_id_order() {
        let a = EntryId(5);
        let b = EntryId(300);
        assert!(a.key() < b.key());
        assert_eq!(EntryId::from_key(&b.key()).unwrap(), b);
    }
}

//! # Search Filters
//!
//! The filter AST, the RFC 4515 string parser, and full in-memory entry
//! matching. Index-driven candidate narrowing lives in
//! [`super::candidate`]; whatever candidates an index produces, the final
//! answer always comes from [`Filter::matches`] against the stored entry.

use crate::dn::normalize_value;
use crate::entry::Entry;
use crate::index::indexer::phonetic_code;
use eyre::{bail, ensure, Result};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality {
        attr: String,
        value: String,
    },
    Substring {
        attr: String,
        initial: Option<String>,
        any: Vec<String>,
        final_: Option<String>,
    },
    Presence {
        attr: String,
    },
    GreaterOrEqual {
        attr: String,
        value: String,
    },
    LessOrEqual {
        attr: String,
        value: String,
    },
    Approximate {
        attr: String,
        value: String,
    },
}

impl Filter {
    pub fn equality(attr: &str, value: &str) -> Filter {
        Filter::Equality {
            attr: attr.to_ascii_lowercase(),
            value: value.to_string(),
        }
    }

    pub fn presence(attr: &str) -> Filter {
        Filter::Presence {
            attr: attr.to_ascii_lowercase(),
        }
    }

    /// Parses the parenthesized LDAP filter string form, e.g.
    /// `(&(objectclass=person)(|(cn=Aaccf*)(uid=user.0)))`.
    pub fn parse(s: &str) -> Result<Filter> {
        let bytes: Vec<char> = s.trim().chars().collect();
        let mut pos = 0;
        let filter = parse_filter(&bytes, &mut pos)?;
        ensure!(pos == bytes.len(), "trailing characters after filter");
        Ok(filter)
    }

    /// In-memory evaluation against one entry; the authoritative answer.
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::And(subs) => subs.iter().all(|f| f.matches(entry)),
            Filter::Or(subs) => subs.iter().any(|f| f.matches(entry)),
            Filter::Not(sub) => !sub.matches(entry),
            Filter::Equality { attr, value } => entry.has_value(attr, value),
            Filter::Presence { attr } => entry.has_attribute(attr),
            Filter::Substring {
                attr,
                initial,
                any,
                final_,
            } => entry
                .attribute(attr)
                .map(|values| {
                    values
                        .iter()
                        .any(|v| substring_matches(v, initial, any, final_))
                })
                .unwrap_or(false),
            Filter::GreaterOrEqual { attr, value } => {
                let norm = normalize_value(value);
                entry
                    .attribute(attr)
                    .map(|values| values.iter().any(|v| normalize_value(v) >= norm))
                    .unwrap_or(false)
            }
            Filter::LessOrEqual { attr, value } => {
                let norm = normalize_value(value);
                entry
                    .attribute(attr)
                    .map(|values| values.iter().any(|v| normalize_value(v) <= norm))
                    .unwrap_or(false)
            }
            Filter::Approximate { attr, value } => {
                let want = phonetic_codes(value);
                entry
                    .attribute(attr)
                    .map(|values| values.iter().any(|v| phonetic_codes(v) == want))
                    .unwrap_or(false)
            }
        }
    }
}

fn phonetic_codes(value: &str) -> Vec<String> {
    normalize_value(value)
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(phonetic_code)
        .collect()
}

fn substring_matches(
    value: &str,
    initial: &Option<String>,
    any: &[String],
    final_: &Option<String>,
) -> bool {
    let norm = normalize_value(value);
    let mut rest = norm.as_str();
    if let Some(initial) = initial {
        let initial = normalize_value(initial);
        match rest.strip_prefix(initial.as_str()) {
            Some(r) => rest = r,
            None => return false,
        }
    }
    if let Some(final_) = final_ {
        let final_ = normalize_value(final_);
        match rest.strip_suffix(final_.as_str()) {
            Some(r) => rest = r,
            None => return false,
        }
    }
    for fragment in any {
        let fragment = normalize_value(fragment);
        match rest.find(fragment.as_str()) {
            Some(at) => rest = &rest[at + fragment.len()..],
            None => return false,
        }
    }
    true
}

fn parse_filter(chars: &[char], pos: &mut usize) -> Result<Filter> {
    ensure!(
        chars.get(*pos) == Some(&'('),
        "expected '(' at position {}",
        pos
    );
    *pos += 1;
    let filter = match chars.get(*pos) {
        Some('&') => {
            *pos += 1;
            Filter::And(parse_filter_list(chars, pos)?)
        }
        Some('|') => {
            *pos += 1;
            Filter::Or(parse_filter_list(chars, pos)?)
        }
        Some('!') => {
            *pos += 1;
            Filter::Not(Box::new(parse_filter(chars, pos)?))
        }
        Some(_) => parse_item(chars, pos)?,
        None => bail!("unterminated filter"),
    };
    ensure!(
        chars.get(*pos) == Some(&')'),
        "expected ')' at position {}",
        pos
    );
    *pos += 1;
    Ok(filter)
}

fn parse_filter_list(chars: &[char], pos: &mut usize) -> Result<Vec<Filter>> {
    let mut subs = Vec::new();
    while chars.get(*pos) == Some(&'(') {
        subs.push(parse_filter(chars, pos)?);
    }
    ensure!(!subs.is_empty(), "empty filter list at position {}", pos);
    Ok(subs)
}

fn parse_item(chars: &[char], pos: &mut usize) -> Result<Filter> {
    let mut attr = String::new();
    let mut op = '=';
    while let Some(&c) = chars.get(*pos) {
        match c {
            '=' => {
                *pos += 1;
                break;
            }
            '>' | '<' | '~' => {
                op = c;
                *pos += 1;
                ensure!(
                    chars.get(*pos) == Some(&'='),
                    "expected '=' after '{}' at position {}",
                    c,
                    pos
                );
                *pos += 1;
                break;
            }
            ')' | '(' => bail!("filter component has no '=' before position {}", pos),
            _ => {
                attr.push(c);
                *pos += 1;
            }
        }
    }
    let attr = attr.trim().to_ascii_lowercase();
    ensure!(!attr.is_empty(), "empty attribute at position {}", pos);

    // value runs to the closing paren; '*' splits substring components
    let mut parts: Vec<String> = vec![String::new()];
    let mut starred = false;
    while let Some(&c) = chars.get(*pos) {
        match c {
            ')' => break,
            '*' => {
                starred = true;
                parts.push(String::new());
                *pos += 1;
            }
            '\\' => {
                let hi = chars.get(*pos + 1).and_then(|c| c.to_digit(16));
                let lo = chars.get(*pos + 2).and_then(|c| c.to_digit(16));
                let (Some(hi), Some(lo)) = (hi, lo) else {
                    bail!("bad escape at position {}", pos);
                };
                parts
                    .last_mut()
                    .unwrap()
                    .push(char::from((hi * 16 + lo) as u8));
                *pos += 3;
            }
            _ => {
                parts.last_mut().unwrap().push(c);
                *pos += 1;
            }
        }
    }

    match op {
        '>' => {
            ensure!(!starred, "'>=' value may not contain '*'");
            Ok(Filter::GreaterOrEqual {
                attr,
                value: parts.remove(0),
            })
        }
        '<' => {
            ensure!(!starred, "'<=' value may not contain '*'");
            Ok(Filter::LessOrEqual {
                attr,
                value: parts.remove(0),
            })
        }
        '~' => {
            ensure!(!starred, "'~=' value may not contain '*'");
            Ok(Filter::Approximate {
                attr,
                value: parts.remove(0),
            })
        }
        _ => {
            if !starred {
                return Ok(Filter::Equality {
                    attr,
                    value: parts.remove(0),
                });
            }
            if parts.len() == 2 && parts[0].is_empty() && parts[1].is_empty() {
                return Ok(Filter::Presence { attr });
            }
            let final_part = parts.pop().unwrap();
            let initial_part = parts.remove(0);
            Ok(Filter::Substring {
                attr,
                initial: (!initial_part.is_empty()).then_some(initial_part),
                any: parts.into_iter().filter(|p| !p.is_empty()).collect(),
                final_: (!final_part.is_empty()).then_some(final_part),
            })
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(subs) => {
                write!(f, "(&")?;
                for s in subs {
                    write!(f, "{}", s)?;
                }
                write!(f, ")")
            }
            Filter::Or(subs) => {
                write!(f, "(|")?;
                for s in subs {
                    write!(f, "{}", s)?;
                }
                write!(f, ")")
            }
            Filter::Not(sub) => write!(f, "(!{})", sub),
            Filter::Equality { attr, value } => write!(f, "({}={})", attr, escape(value)),
            Filter::Presence { attr } => write!(f, "({}=*)", attr),
            Filter::Substring {
                attr,
                initial,
                any,
                final_,
            } => {
                write!(f, "({}=", attr)?;
                if let Some(i) = initial {
                    write!(f, "{}", escape(i))?;
                }
                for a in any {
                    write!(f, "*{}", escape(a))?;
                }
                write!(f, "*")?;
                if let Some(fi) = final_ {
                    write!(f, "{}", escape(fi))?;
                }
                write!(f, ")")
            }
            Filter::GreaterOrEqual { attr, value } => write!(f, "({}>={})", attr, escape(value)),
            Filter::LessOrEqual { attr, value } => write!(f, "({}<={})", attr, escape(value)),
            Filter::Approximate { attr, value } => write!(f, "({}~={})", attr, escape(value)),
        }
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\\' => out.push_str("\\5c"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::Dn;

    fn entry() -> Entry {
        Entry::new(Dn::parse("uid=user.0,ou=People,dc=test,dc=com").unwrap())
            .with_attribute("objectclass", vec!["top", "person"])
            .with_attribute("cn", vec!["Aaccf Amar"])
            .with_attribute("sn", vec!["Amar"])
            .with_attribute("uid", vec!["user.0"])
    }

    #[test]
    fn parse_simple_forms() {
        assert_eq!(
            Filter::parse("(cn=Aaccf Amar)").unwrap(),
            Filter::equality("cn", "Aaccf Amar")
        );
        assert_eq!(Filter::parse("(cn=*)").unwrap(), Filter::presence("cn"));
        assert_eq!(
            Filter::parse("(CN>=m)").unwrap(),
            Filter::GreaterOrEqual {
                attr: "cn".to_string(),
                value: "m".to_string()
            }
        );
        assert_eq!(
            Filter::parse("(cn~=amar)").unwrap(),
            Filter::Approximate {
                attr: "cn".to_string(),
                value: "amar".to_string()
            }
        );
    }

    #[test]
    fn parse_substring_components() {
        let f = Filter::parse("(cn=Aa*cf*mar)").unwrap();
        assert_eq!(
            f,
            Filter::Substring {
                attr: "cn".to_string(),
                initial: Some("Aa".to_string()),
                any: vec!["cf".to_string()],
                final_: Some("mar".to_string()),
            }
        );
        let f = Filter::parse("(cn=*Amar)").unwrap();
        assert_eq!(
            f,
            Filter::Substring {
                attr: "cn".to_string(),
                initial: None,
                any: vec![],
                final_: Some("Amar".to_string()),
            }
        );
    }

    #[test]
    fn parse_composites_round_trip() {
        let s = "(&(objectclass=person)(|(cn=a*)(!(uid=user.0))))";
        let f = Filter::parse(s).unwrap();
        assert_eq!(f.to_string(), s);
        assert!(Filter::parse("(&)").is_err());
        assert!(Filter::parse("(cn=x)(sn=y)").is_err());
    }

    #[test]
    fn parse_hex_escapes() {
        let f = Filter::parse("(cn=a\\2ab)").unwrap();
        assert_eq!(f, Filter::equality("cn", "a*b"));
    }

    #[test]
    fn matching_is_normalized() {
        let e = entry();
        assert!(Filter::parse("(cn=AACCF  amar)").unwrap().matches(&e));
        assert!(Filter::parse("(cn=*)").unwrap().matches(&e));
        assert!(!Filter::parse("(mail=*)").unwrap().matches(&e));
        assert!(Filter::parse("(objectclass=PERSON)").unwrap().matches(&e));
    }

    #[test]
    fn substring_matching_is_ordered() {
        let e = entry();
        assert!(Filter::parse("(cn=Aa*cf*mar)").unwrap().matches(&e));
        assert!(Filter::parse("(cn=*Amar)").unwrap().matches(&e));
        assert!(Filter::parse("(cn=*ccf*)").unwrap().matches(&e));
        assert!(!Filter::parse("(cn=mar*Aa)").unwrap().matches(&e));
        assert!(!Filter::parse("(cn=*mar*ccf*)").unwrap().matches(&e));
    }

    #[test]
    fn range_and_approximate_matching() {
        let e = entry();
        assert!(Filter::parse("(cn>=aaccf amar)").unwrap().matches(&e));
        assert!(Filter::parse("(cn<=b)").unwrap().matches(&e));
        assert!(!Filter::parse("(cn>=b)").unwrap().matches(&e));
        assert!(Filter::parse("(sn~=amr)").unwrap().matches(&e));
        assert!(!Filter::parse("(sn~=smith)").unwrap().matches(&e));
    }

    #[test]
    fn boolean_composition() {
        let e = entry();
        assert!(Filter::parse("(&(cn=aaccf amar)(uid=user.0))")
            .unwrap()
            .matches(&e));
        assert!(Filter::parse("(|(cn=nobody)(uid=user.0))")
            .unwrap()
            .matches(&e));
        assert!(Filter::parse("(!(cn=nobody))").unwrap().matches(&e));
        assert!(!Filter::parse("(&(cn=aaccf amar)(cn=nobody))")
            .unwrap()
            .matches(&e));
    }
}

//! # LDIF Reading and Writing
//!
//! A line-oriented LDIF codec sized for the import pipeline: the reader
//! yields one entry per record and keeps going after a bad record (the
//! error carries the offending DN line so import can route it to the
//! reject stream); the writer produces the reject and skip files.
//!
//! The two failure kinds are kept apart in [`LdifError`]: a `Record`
//! error is local to one record and the stream continues, an `Io` error
//! means the underlying reader failed and the stream ends there.
//!
//! Continuation lines (leading space), comment lines (`#`), and a leading
//! `version:` line are handled. Base64 values (`::`) and URL values
//! (`:<`) are reported as record errors rather than silently mangled.

use crate::dn::Dn;
use crate::entry::Entry;
use eyre::{bail, eyre, Result, WrapErr};
use std::io::{BufRead, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LdifError {
    #[error("failed to read LDIF input")]
    Io(#[source] std::io::Error),

    #[error(transparent)]
    Record(eyre::Report),
}

pub struct LdifReader<R: BufRead> {
    input: R,
    done: bool,
}

impl<R: BufRead> LdifReader<R> {
    pub fn new(input: R) -> LdifReader<R> {
        LdifReader { input, done: false }
    }

    /// Physical lines of the next record, comments stripped and
    /// continuations unfolded. `None` at end of input.
    fn next_record_lines(&mut self) -> Result<Option<Vec<String>>, LdifError> {
        let mut lines: Vec<String> = Vec::new();
        loop {
            let mut raw = String::new();
            let n = match self.input.read_line(&mut raw) {
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    return Err(LdifError::Io(e));
                }
            };
            if n == 0 {
                self.done = true;
                break;
            }
            let line = raw.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if lines.is_empty() {
                    continue;
                }
                break;
            }
            if line.starts_with('#') {
                continue;
            }
            if let Some(rest) = line.strip_prefix(' ') {
                match lines.last_mut() {
                    Some(last) => last.push_str(rest),
                    None => {
                        return Err(LdifError::Record(eyre!(
                            "continuation line without a preceding line"
                        )))
                    }
                }
                continue;
            }
            if lines.is_empty() && line.to_ascii_lowercase().starts_with("version:") {
                continue;
            }
            lines.push(line.to_string());
        }
        if lines.is_empty() {
            Ok(None)
        } else {
            Ok(Some(lines))
        }
    }
}

fn parse_record(lines: &[String]) -> Result<Entry> {
    let first = &lines[0];
    let dn_value = first
        .strip_prefix("dn:")
        .ok_or_else(|| eyre!("record does not start with 'dn:': '{}'", first))?;
    if dn_value.starts_with(':') {
        bail!("base64 DNs are not supported: '{}'", first);
    }
    let dn = Dn::parse(dn_value.trim()).wrap_err_with(|| format!("bad DN in '{}'", first))?;

    let mut entry = Entry::new(dn);
    for line in &lines[1..] {
        let Some(colon) = line.find(':') else {
            bail!("attribute line has no ':': '{}'", line);
        };
        let attr = line[..colon].trim();
        let rest = &line[colon + 1..];
        if attr.is_empty() {
            bail!("attribute line has an empty name: '{}'", line);
        }
        if let Some(stripped) = rest.strip_prefix(':') {
            bail!("base64 values are not supported: '{}: {}'", attr, stripped.trim());
        }
        if rest.starts_with('<') {
            bail!("URL values are not supported: '{}'", line);
        }
        entry = entry.with_attribute(attr, vec![rest.trim_start()]);
    }
    Ok(entry)
}

impl<R: BufRead> Iterator for LdifReader<R> {
    type Item = Result<Entry, LdifError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record_lines() {
            Err(e) => Some(Err(e)),
            Ok(None) => None,
            Ok(Some(lines)) => Some(parse_record(&lines).map_err(LdifError::Record)),
        }
    }
}

pub struct LdifWriter<W: Write> {
    output: W,
}

impl<W: Write> LdifWriter<W> {
    pub fn new(output: W) -> LdifWriter<W> {
        LdifWriter { output }
    }

    pub fn write_comment(&mut self, comment: &str) -> Result<()> {
        for line in comment.lines() {
            writeln!(self.output, "# {}", line).wrap_err("failed to write LDIF comment")?;
        }
        Ok(())
    }

    pub fn write_entry(&mut self, entry: &Entry) -> Result<()> {
        writeln!(self.output, "dn: {}", entry.dn()).wrap_err("failed to write LDIF record")?;
        let names: Vec<&str> = entry.attribute_names().collect();
        for name in names {
            for value in entry.attribute(name).unwrap_or(&[]) {
                writeln!(self.output, "{}: {}", name, value)
                    .wrap_err("failed to write LDIF record")?;
            }
        }
        writeln!(self.output).wrap_err("failed to write LDIF record")?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.output
    }
}

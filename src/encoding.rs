//! # Variable-Length Integer and Byte-String Encoding
//!
//! Compact encodings used by the entry codec and the index ID-set codec.
//! Values are length fields and counters, so the format is optimized for
//! small numbers and does not need to be byte-comparable.
//!
//! ## Varint Format
//!
//! A leading marker byte selects the encoding:
//!
//! | Value Range          | Bytes | Format                            |
//! |----------------------|-------|-----------------------------------|
//! | 0 - 247              | 1     | `[value]`                         |
//! | larger               | 1 + n | `[0xF8 + n, n big-endian bytes]`  |
//!
//! where `n` (1..=8) is the minimal number of big-endian bytes required.
//! Markers 0xF8..=0xFF are therefore reserved and never appear as a
//! single-byte value.
//!
//! ## Byte Strings
//!
//! A byte string is a varint length followed by the raw bytes. Decoding is
//! bounds-checked and never panics on truncated input.

use eyre::{bail, ensure, Result};

const VARINT_MAX_INLINE: u8 = 0xF7;
const VARINT_MARKER_BASE: u8 = 0xF8;

pub fn write_varint(buf: &mut Vec<u8>, value: u64) {
    if value <= VARINT_MAX_INLINE as u64 {
        buf.push(value as u8);
        return;
    }
    let be = value.to_be_bytes();
    let skip = be.iter().take_while(|b| **b == 0).count();
    let n = 8 - skip;
    buf.push(VARINT_MARKER_BASE + (n as u8 - 1));
    buf.extend_from_slice(&be[skip..]);
}

pub fn read_varint(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let Some(&marker) = buf.get(*pos) else {
        bail!("truncated varint at offset {}", *pos);
    };
    *pos += 1;
    if marker <= VARINT_MAX_INLINE {
        return Ok(marker as u64);
    }
    let n = (marker - VARINT_MARKER_BASE) as usize + 1;
    ensure!(
        *pos + n <= buf.len(),
        "truncated varint payload at offset {} (need {} bytes)",
        *pos,
        n
    );
    let mut value = 0u64;
    for _ in 0..n {
        value = (value << 8) | buf[*pos] as u64;
        *pos += 1;
    }
    Ok(value)
}

pub fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

pub fn read_bytes<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8]> {
    let len = read_varint(buf, pos)? as usize;
    ensure!(
        *pos + len <= buf.len(),
        "truncated byte string at offset {} (need {} bytes)",
        *pos,
        len
    );
    let out = &buf[*pos..*pos + len];
    *pos += len;
    Ok(out)
}

pub fn write_str(buf: &mut Vec<u8>, s: &str) {
    write_bytes(buf, s.as_bytes());
}

pub fn read_str(buf: &[u8], pos: &mut usize) -> Result<String> {
    let bytes = read_bytes(buf, pos)?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trip() {
        let samples = [
            0u64,
            1,
            0xF7,
            0xF8,
            255,
            256,
            65535,
            65536,
            1 << 24,
            u32::MAX as u64,
            u64::MAX,
        ];
        for v in samples {
            let mut buf = Vec::new();
            write_varint(&mut buf, v);
            let mut pos = 0;
            assert_eq!(read_varint(&buf, &mut pos).unwrap(), v);
            assert_eq!(pos, buf.len());
        }
    }

    #[test]
    fn small_values_are_one_byte() {
        for v in 0..=0xF7u64 {
            let mut buf = Vec::new();
            write_varint(&mut buf, v);
            assert_eq!(buf.len(), 1);
        }
    }

    #[test]
    fn truncated_varint_is_an_error() {
        let mut buf = Vec::new();
        write_varint(&mut buf, u64::MAX);
        let mut pos = 0;
        assert!(read_varint(&buf[..4], &mut pos).is_err());
    }

    #[test]
    fn byte_string_round_trip() {
        let mut buf = Vec::new();
        write_bytes(&mut buf, b"hello");
        write_bytes(&mut buf, b"");
        write_str(&mut buf, "ou=People");
        let mut pos = 0;
        assert_eq!(read_bytes(&buf, &mut pos).unwrap(), b"hello");
        assert_eq!(read_bytes(&buf, &mut pos).unwrap(), b"");
        assert_eq!(read_str(&buf, &mut pos).unwrap(), "ou=People");
        assert_eq!(pos, buf.len());
    }
}

//! # Tree Snapshot Persistence
//!
//! One file per tree, written atomically (temp file + rename) and guarded
//! by a CRC64 checksum over the payload.
//!
//! ## File Format
//!
//! ```text
//! [4]  magic "DTR1"
//! [..] payload:
//!        [varint name-len][tree name bytes]
//!        [varint record-count]
//!        per record: [varint klen][key][varint vlen][value]
//! [8]  CRC64 (ECMA-182) of the payload, little-endian
//! ```
//!
//! The tree name is stored inside the file, so the snapshot filename only
//! needs to be unique, not reversible: characters outside `[A-Za-z0-9._-]`
//! are percent-encoded when deriving it.

use super::TreeMap;
use crate::encoding::{read_bytes, read_str, read_varint, write_bytes, write_str, write_varint};
use crc::{Crc, CRC_64_ECMA_182};
use eyre::{bail, ensure, Result, WrapErr};
use std::fs;
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 4] = b"DTR1";

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

pub fn snapshot_file_name(tree_name: &str) -> String {
    let mut out = String::with_capacity(tree_name.len() + 8);
    for b in tree_name.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-') {
            out.push(b as char);
        } else {
            out.push('%');
            out.push_str(&format!("{:02x}", b));
        }
    }
    out.push_str(".tree");
    out
}

/// Serializes one tree to its snapshot file; returns the final path.
pub fn store_tree(dir: &Path, name: &str, map: &TreeMap) -> Result<PathBuf> {
    let mut payload = Vec::new();
    write_str(&mut payload, name);
    write_varint(&mut payload, map.len() as u64);
    for (k, v) in map {
        write_bytes(&mut payload, k);
        write_bytes(&mut payload, v);
    }

    let mut file = Vec::with_capacity(payload.len() + 12);
    file.extend_from_slice(MAGIC);
    file.extend_from_slice(&payload);
    file.extend_from_slice(&CRC64.checksum(&payload).to_le_bytes());

    let path = dir.join(snapshot_file_name(name));
    let tmp = path.with_extension("tree.tmp");
    fs::write(&tmp, &file).wrap_err_with(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, &path)
        .wrap_err_with(|| format!("failed to move snapshot into place at {}", path.display()))?;
    Ok(path)
}

/// Loads and checksum-validates one snapshot file.
pub fn load_tree(path: &Path) -> Result<(String, TreeMap)> {
    let data = fs::read(path).wrap_err_with(|| format!("failed to read {}", path.display()))?;
    ensure!(data.len() >= MAGIC.len() + 8, "snapshot file too short");
    ensure!(&data[..4] == MAGIC, "bad snapshot magic");

    let payload = &data[4..data.len() - 8];
    let mut stored = [0u8; 8];
    stored.copy_from_slice(&data[data.len() - 8..]);
    let stored = u64::from_le_bytes(stored);
    let computed = CRC64.checksum(payload);
    if stored != computed {
        bail!(
            "snapshot checksum mismatch (stored {:016x}, computed {:016x})",
            stored,
            computed
        );
    }

    let mut pos = 0;
    let name = read_str(payload, &mut pos)?;
    let count = read_varint(payload, &mut pos)?;
    let mut map = TreeMap::new();
    for _ in 0..count {
        let k = read_bytes(payload, &mut pos)?.to_vec();
        let v = read_bytes(payload, &mut pos)?.to_vec();
        map.insert(k, v);
    }
    ensure!(pos == payload.len(), "trailing bytes in snapshot payload");
    Ok((name, map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn store_load_round_trip() {
        let dir = tempdir().unwrap();
        let mut map = TreeMap::new();
        map.insert(b"alpha".to_vec(), b"1".to_vec());
        map.insert(b"beta".to_vec(), vec![0u8; 300]);
        let path = store_tree(dir.path(), "dc=test,dc=com_id2entry", &map).unwrap();
        let (name, loaded) = load_tree(&path).unwrap();
        assert_eq!(name, "dc=test,dc=com_id2entry");
        assert_eq!(loaded, map);
    }

    #[test]
    fn corruption_is_detected() {
        let dir = tempdir().unwrap();
        let mut map = TreeMap::new();
        map.insert(b"k".to_vec(), b"v".to_vec());
        let path = store_tree(dir.path(), "t", &map).unwrap();

        let mut data = fs::read(&path).unwrap();
        let mid = data.len() / 2;
        data[mid] ^= 0xFF;
        fs::write(&path, &data).unwrap();
        assert!(load_tree(&path).is_err());
    }

    #[test]
    fn file_names_are_filesystem_safe() {
        let name = snapshot_file_name("dc=test,dc=com_cn.substring.6");
        assert!(!name.contains('='));
        assert!(!name.contains(','));
        assert!(name.ends_with(".tree"));
    }
}

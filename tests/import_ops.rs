//! Bulk import through the public surface: rebuild, append, routing of
//! skips and rejects, and persistence of the imported state.

use dirstore::{
    BackendConfig, Dn, Filter, ImportConfig, ImportJob, IndexConfig, IndexType, LdifReader,
    RootContainer, SearchRequest, SearchScope,
};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use tempfile::tempdir;

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn dn(s: &str) -> Dn {
    Dn::parse(s).unwrap()
}

fn config(dir: &std::path::Path) -> BackendConfig {
    BackendConfig::builder()
        .db_path(dir.join("db"))
        .base_dn("dc=test,dc=com")
        .index(
            "cn",
            IndexConfig::new([IndexType::Presence, IndexType::Equality, IndexType::Substring]),
        )
        .build()
        .unwrap()
}

const LDIF: &str = "\
version: 1
dn: dc=test,dc=com
objectClass: domain
dc: test

dn: ou=People,dc=test,dc=com
objectClass: organizationalUnit
ou: People

dn: uid=user.0,ou=People,dc=test,dc=com
objectClass: person
cn: Aaccf Amar
uid: user.0

dn: uid=user.539,ou=People,dc=test,dc=com
objectClass: person
cn: Ardyth Bainton
uid: user.539

dn: dc=other,dc=org
objectClass: domain

dn: uid=orphan,ou=Nowhere,dc=test,dc=com
objectClass: person
cn: Orphan
";

fn search(ec: &dirstore::EntryContainer, filter: &str) -> usize {
    ec.search(&SearchRequest::new(
        dn("dc=test,dc=com"),
        SearchScope::Subtree,
        Filter::parse(filter).unwrap(),
    ))
    .unwrap()
    .entries
    .len()
}

#[test]
fn rebuild_import_with_routing() {
    let dir = tempdir().unwrap();
    let root = RootContainer::open(config(dir.path())).unwrap();
    let ec = root.container(&dn("dc=test,dc=com")).unwrap();

    let reject = SharedBuf::default();
    let skip = SharedBuf::default();
    let mut job = ImportJob::new(&ec, ImportConfig::default())
        .reject_to(reject.clone())
        .skip_to(skip.clone());
    let result = job.run(LdifReader::new(LDIF.as_bytes())).unwrap();

    assert_eq!(result.entries_read, 6);
    assert_eq!(result.imported, 4);
    assert_eq!(result.skipped, 1, "dc=other,dc=org is outside the base");
    assert_eq!(result.rejected, 1, "the orphan has no parent");

    assert!(skip.contents().contains("dn: dc=other,dc=org"));
    assert!(reject.contents().contains("uid=orphan"));

    assert_eq!(ec.entry_count().unwrap(), 4);
    assert_eq!(search(&ec, "(cn=Aaccf Amar)"), 1);
    assert_eq!(search(&ec, "(cn=*ainto*)"), 1);
}

#[test]
fn imported_state_survives_checkpoint_and_reopen() {
    let dir = tempdir().unwrap();
    {
        let root = RootContainer::open(config(dir.path())).unwrap();
        let ec = root.container(&dn("dc=test,dc=com")).unwrap();
        let mut job = ImportJob::new(&ec, ImportConfig::default());
        job.run(LdifReader::new(LDIF.as_bytes())).unwrap();
        root.checkpoint().unwrap();
    }
    let root = RootContainer::open(config(dir.path())).unwrap();
    let ec = root.container(&dn("dc=test,dc=com")).unwrap();
    assert_eq!(ec.entry_count().unwrap(), 4);
    assert_eq!(search(&ec, "(cn=Ardyth Bainton)"), 1);
}

#[test]
fn rebuild_import_is_usable_immediately_after() {
    let dir = tempdir().unwrap();
    let root = RootContainer::open(config(dir.path())).unwrap();
    let ec = root.container(&dn("dc=test,dc=com")).unwrap();
    let mut job = ImportJob::new(&ec, ImportConfig::default());
    job.run(LdifReader::new(LDIF.as_bytes())).unwrap();

    // entry operations and index maintenance continue on the swapped trees
    ec.delete_entry(&dn("uid=user.0,ou=People,dc=test,dc=com"), false, None)
        .unwrap();
    assert_eq!(search(&ec, "(cn=Aaccf Amar)"), 0);

    ec.add_entry(
        &dirstore::Entry::new(dn("uid=user.1,ou=People,dc=test,dc=com"))
            .with_attribute("objectclass", vec!["person"])
            .with_attribute("cn", vec!["Brand New"])
            .with_attribute("uid", vec!["user.1"]),
    )
    .unwrap();
    assert_eq!(search(&ec, "(cn=Brand New)"), 1);
}

#[test]
fn append_import_over_existing_data() {
    let dir = tempdir().unwrap();
    let root = RootContainer::open(config(dir.path())).unwrap();
    let ec = root.container(&dn("dc=test,dc=com")).unwrap();
    let mut job = ImportJob::new(&ec, ImportConfig::default());
    job.run(LdifReader::new(LDIF.as_bytes())).unwrap();

    let extra = "\
dn: uid=user.2,ou=People,dc=test,dc=com
objectClass: person
cn: Second Wave
uid: user.2
";
    let mut job = ImportJob::new(
        &ec,
        ImportConfig {
            append: true,
            ..ImportConfig::default()
        },
    );
    let result = job.run(LdifReader::new(extra.as_bytes())).unwrap();
    assert_eq!(result.imported, 1);
    assert_eq!(ec.entry_count().unwrap(), 5);
    assert_eq!(search(&ec, "(cn=Second Wave)"), 1);
    assert_eq!(search(&ec, "(cn=Aaccf Amar)"), 1, "append must keep prior entries");
}

#[test]
fn exclude_branches_prune_a_subtree() {
    let dir = tempdir().unwrap();
    let root = RootContainer::open(config(dir.path())).unwrap();
    let ec = root.container(&dn("dc=test,dc=com")).unwrap();

    let mut job = ImportJob::new(
        &ec,
        ImportConfig {
            exclude_branches: vec![dn("ou=People,dc=test,dc=com")],
            ..ImportConfig::default()
        },
    );
    let result = job.run(LdifReader::new(LDIF.as_bytes())).unwrap();
    assert_eq!(result.imported, 1, "only the base entry survives the exclusion");
    assert_eq!(result.skipped, 4);
}

//! # Search Execution
//!
//! A search runs in two phases: index-driven candidate narrowing
//! ([`candidate`]) and verification. Candidates are intersected with the
//! set of in-scope entry IDs, then every surviving entry is fetched and
//! checked against the filter, so index false positives never leak out.
//! When narrowing yields the undefined set the search walks the scope
//! instead, matching every entry in it.
//!
//! A referral entry at or above the search base short-circuits the whole
//! search into a referral result carrying the stored URIs.
//!
//! `debug_search_index` turns the search into a diagnostic: no entries
//! are returned, only a trace of every index lookup, ending with
//! `final=<count>` when the candidate set stayed defined.

pub mod candidate;
pub mod filter;

pub use candidate::FilterEvaluator;
pub use filter::Filter;

use crate::container::EntryContainer;
use crate::dn::Dn;
use crate::entry::{Entry, EntryId};
use crate::error::{OperationError, OpResult};
use crate::index::EntryIdSet;
use eyre::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Base,
    OneLevel,
    Subtree,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub base_dn: Dn,
    pub scope: SearchScope,
    pub filter: Filter,
    pub debug_search_index: bool,
}

impl SearchRequest {
    pub fn new(base_dn: Dn, scope: SearchScope, filter: Filter) -> SearchRequest {
        SearchRequest {
            base_dn,
            scope,
            filter,
            debug_search_index: false,
        }
    }

    /// Ask for the index-usage trace instead of entries.
    pub fn debug_search_index(mut self) -> SearchRequest {
        self.debug_search_index = true;
        self
    }
}

#[derive(Debug)]
pub struct SearchResult {
    pub entries: Vec<Entry>,
    pub referral_uris: Vec<String>,
    pub debug_trace: Option<String>,
}

impl SearchResult {
    pub fn is_referral(&self) -> bool {
        !self.referral_uris.is_empty()
    }
}

pub(crate) fn execute(ec: &EntryContainer, req: &SearchRequest) -> OpResult<SearchResult> {
    if !req.base_dn.is_subordinate_or_equal(ec.base_dn()) {
        return Err(OperationError::NoSuchObject {
            dn: req.base_dn.clone(),
            matched_dn: None,
        });
    }
    let store = ec.store();
    if let Some((_, uris)) = ec
        .dn2uri()
        .nearest_referral(store, &req.base_dn, ec.base_dn(), true)?
    {
        return Ok(SearchResult {
            entries: Vec::new(),
            referral_uris: uris,
            debug_trace: None,
        });
    }
    let Some(base_id) = ec.dn2id().get(store, &req.base_dn)? else {
        let matched_dn = ec.dn2id().matched_dn(store, &req.base_dn, ec.base_dn())?;
        return Err(OperationError::NoSuchObject {
            dn: req.base_dn.clone(),
            matched_dn,
        });
    };

    let mut evaluator = FilterEvaluator::new(ec, req.debug_search_index);
    let candidates = evaluator.evaluate(&req.filter)?;
    let indexed = candidates.is_defined();
    let in_scope = scope_ids(ec, req, base_id)?;
    let narrowed = candidates.intersect(&EntryIdSet::from_ids(in_scope.clone()));

    if req.debug_search_index {
        let mut trace = evaluator.into_trace().unwrap_or_default();
        // The scope set is always defined, so narrowed is too; only an
        // indexed evaluation earns a final count.
        if indexed {
            if let Some(count) = narrowed.size() {
                trace.push_str(&format!("final={}", count));
            }
        }
        return Ok(SearchResult {
            entries: Vec::new(),
            referral_uris: Vec::new(),
            debug_trace: Some(trace),
        });
    }

    let ids: Vec<EntryId> = if narrowed.is_defined() {
        narrowed.iter().collect()
    } else {
        in_scope
    };
    let mut entries = Vec::new();
    for id in ids {
        if let Some(entry) = ec.id2entry().get(store, id)? {
            if req.filter.matches(&entry) {
                entries.push(entry);
            }
        }
    }
    Ok(SearchResult {
        entries,
        referral_uris: Vec::new(),
        debug_trace: None,
    })
}

/// Entry IDs inside the request's scope, in ID order.
fn scope_ids(ec: &EntryContainer, req: &SearchRequest, base_id: EntryId) -> Result<Vec<EntryId>> {
    let store = ec.store();
    let mut ids = match req.scope {
        SearchScope::Base => vec![base_id],
        SearchScope::OneLevel => ec.dn2id().children(store, &req.base_dn)?,
        SearchScope::Subtree => {
            let mut ids = vec![base_id];
            ids.extend(
                ec.dn2id()
                    .subtree(store, &req.base_dn)?
                    .iter()
                    .map(|(_, id)| *id),
            );
            ids
        }
    };
    ids.sort_unstable();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::index::indexer::IndexType;
    use crate::storage::TreeStore;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn container() -> (tempfile::TempDir, EntryContainer) {
        let dir = tempdir().unwrap();
        let store = Arc::new(TreeStore::create(&dir.path().join("db")).unwrap());
        let mut indexes = BTreeMap::new();
        indexes.insert(
            "cn".to_string(),
            IndexConfig::new([
                IndexType::Presence,
                IndexType::Equality,
                IndexType::Substring,
            ]),
        );
        let ec = EntryContainer::new(dn("dc=test,dc=com"), store, &indexes, 4000);
        ec.add_entry(&Entry::new(dn("dc=test,dc=com")).with_attribute("objectclass", vec!["domain"]))
            .unwrap();
        ec.add_entry(
            &Entry::new(dn("ou=People,dc=test,dc=com"))
                .with_attribute("objectclass", vec!["organizationalUnit"]),
        )
        .unwrap();
        for (i, cn) in ["Aaccf Amar", "Ardyth Bainton"].iter().enumerate() {
            ec.add_entry(
                &Entry::new(dn(&format!("uid=user.{},ou=People,dc=test,dc=com", i)))
                    .with_attribute("objectclass", vec!["person"])
                    .with_attribute("cn", vec![*cn])
                    .with_attribute("description", vec!["unindexed text"]),
            )
            .unwrap();
        }
        (dir, ec)
    }

    #[test]
    fn subtree_search_by_equality() {
        let (_d, ec) = container();
        let req = SearchRequest::new(
            dn("dc=test,dc=com"),
            SearchScope::Subtree,
            Filter::parse("(cn=aaccf amar)").unwrap(),
        );
        let result = ec.search(&req).unwrap();
        assert_eq!(result.entries.len(), 1);
        assert_eq!(
            result.entries[0].dn(),
            &dn("uid=user.0,ou=People,dc=test,dc=com")
        );
    }

    #[test]
    fn scope_restricts_candidates() {
        let (_d, ec) = container();
        let filter = Filter::parse("(cn=*)").unwrap();
        let base = ec
            .search(&SearchRequest::new(
                dn("dc=test,dc=com"),
                SearchScope::Base,
                filter.clone(),
            ))
            .unwrap();
        assert!(base.entries.is_empty(), "base entry has no cn");

        let one = ec
            .search(&SearchRequest::new(
                dn("ou=People,dc=test,dc=com"),
                SearchScope::OneLevel,
                filter.clone(),
            ))
            .unwrap();
        assert_eq!(one.entries.len(), 2);

        let sub = ec
            .search(&SearchRequest::new(
                dn("dc=test,dc=com"),
                SearchScope::Subtree,
                Filter::parse("(objectclass=*)").unwrap(),
            ))
            .unwrap();
        assert_eq!(sub.entries.len(), 4);
    }

    #[test]
    fn unindexed_filter_falls_back_to_scope_walk() {
        let (_d, ec) = container();
        let req = SearchRequest::new(
            dn("dc=test,dc=com"),
            SearchScope::Subtree,
            Filter::parse("(description=unindexed text)").unwrap(),
        );
        let result = ec.search(&req).unwrap();
        assert_eq!(result.entries.len(), 2);
    }

    #[test]
    fn missing_base_reports_matched_dn() {
        let (_d, ec) = container();
        let req = SearchRequest::new(
            dn("ou=Nope,ou=People,dc=test,dc=com"),
            SearchScope::Subtree,
            Filter::parse("(objectclass=*)").unwrap(),
        );
        let err = ec.search(&req).unwrap_err();
        let OperationError::NoSuchObject { matched_dn, .. } = err else {
            panic!("expected NoSuchObject");
        };
        assert_eq!(matched_dn, Some(dn("ou=People,dc=test,dc=com")));
    }

    #[test]
    fn referral_above_base_short_circuits() {
        let (_d, ec) = container();
        ec.add_entry(
            &Entry::new(dn("ou=Remote,dc=test,dc=com"))
                .with_attribute("objectclass", vec!["referral", "extensibleObject"])
                .with_attribute("ref", vec!["ldap://other.example.com/ou=Remote"]),
        )
        .unwrap();
        let req = SearchRequest::new(
            dn("uid=u,ou=Remote,dc=test,dc=com"),
            SearchScope::Base,
            Filter::parse("(objectclass=*)").unwrap(),
        );
        let result = ec.search(&req).unwrap();
        assert!(result.is_referral());
        assert_eq!(result.referral_uris, vec!["ldap://other.example.com/ou=Remote"]);
    }

    #[test]
    fn debug_search_index_reports_final_count() {
        let (_d, ec) = container();
        let req = SearchRequest::new(
            dn("dc=test,dc=com"),
            SearchScope::Subtree,
            Filter::parse("(|(cn=aaccf amar)(cn=ardyth bainton))").unwrap(),
        )
        .debug_search_index();
        let result = ec.search(&req).unwrap();
        let trace = result.debug_trace.unwrap();
        assert!(result.entries.is_empty());
        assert!(trace.contains("index=cn.equality"));
        assert!(trace.ends_with("final=2"), "trace was: {}", trace);
    }

    #[test]
    fn debug_trace_omits_final_when_undefined() {
        let (_d, ec) = container();
        let req = SearchRequest::new(
            dn("dc=test,dc=com"),
            SearchScope::Subtree,
            Filter::parse("(description=x)").unwrap(),
        )
        .debug_search_index();
        let result = ec.search(&req).unwrap();
        let trace = result.debug_trace.unwrap();
        assert!(!trace.contains("final="), "trace was: {}", trace);
    }
}

//! # Index-Driven Candidate Narrowing
//!
//! Turns a filter into an [`EntryIdSet`] of candidate entries using the
//! container's attribute indexes. Candidates are an over-approximation:
//! the caller still verifies every candidate against the filter. An
//! unindexable sub-filter evaluates to the undefined set, which imposes
//! no bound.
//!
//! Every index lookup draws from a per-evaluation budget
//! ([`FILTER_CANDIDATE_THRESHOLD`]); once exhausted, remaining sub-filters
//! are treated as unindexed. AND children are intersected smallest set
//! first (undefined last, ties in written order) so the working set
//! shrinks as fast as possible.

use super::filter::Filter;
use crate::config::FILTER_CANDIDATE_THRESHOLD;
use crate::container::EntryContainer;
use crate::index::indexer::{
    equality_key, substring_assertion_keys, IndexType, PRESENCE_KEY,
};
use crate::index::EntryIdSet;
use eyre::Result;
use std::fmt::Write;

pub struct FilterEvaluator<'a> {
    container: &'a EntryContainer,
    budget: usize,
    trace: Option<String>,
}

impl<'a> FilterEvaluator<'a> {
    pub fn new(container: &'a EntryContainer, traced: bool) -> FilterEvaluator<'a> {
        FilterEvaluator {
            container,
            budget: FILTER_CANDIDATE_THRESHOLD,
            trace: traced.then(String::new),
        }
    }

    pub fn into_trace(self) -> Option<String> {
        self.trace
    }

    fn record(&mut self, filter: &Filter, index_id: Option<&str>, set: &EntryIdSet) {
        let Some(trace) = self.trace.as_mut() else {
            return;
        };
        let index = index_id.unwrap_or("none");
        match set.size() {
            Some(n) => {
                let _ = writeln!(trace, "filter={} index={} candidates={}", filter, index, n);
            }
            None => {
                let _ = writeln!(
                    trace,
                    "filter={} index={} candidates=undefined",
                    filter, index
                );
            }
        }
    }

    fn take_budget(&mut self) -> bool {
        if self.budget == 0 {
            return false;
        }
        self.budget -= 1;
        true
    }

    pub fn evaluate(&mut self, filter: &Filter) -> Result<EntryIdSet> {
        match filter {
            Filter::And(subs) => {
                let mut results: Vec<EntryIdSet> = Vec::with_capacity(subs.len());
                for sub in subs {
                    results.push(self.evaluate(sub)?);
                }
                // smallest defined set first; undefined sets impose no
                // bound and sort last
                results.sort_by_key(|s| s.size().unwrap_or(usize::MAX));
                let mut out = EntryIdSet::undefined();
                for set in &results {
                    out = out.intersect(set);
                    if out.is_empty() {
                        break;
                    }
                }
                Ok(out)
            }
            Filter::Or(subs) => {
                let mut out = EntryIdSet::new();
                for sub in subs {
                    out = out.union(&self.evaluate(sub)?);
                    if !out.is_defined() {
                        break;
                    }
                }
                Ok(out)
            }
            Filter::Not(_) => {
                // negations are never index-driven
                self.record(filter, None, &EntryIdSet::undefined());
                Ok(EntryIdSet::undefined())
            }
            Filter::Equality { attr, value } => {
                let set = self.lookup(attr, IndexType::Equality, |idx, ev| {
                    idx.read_candidates(ev.container.store(), &equality_key(value))
                })?;
                let label = self.index_label(attr, IndexType::Equality, "equality");
                self.record(filter, label.as_deref(), &set);
                Ok(set)
            }
            Filter::Presence { attr } => {
                let set = self.lookup(attr, IndexType::Presence, |idx, ev| {
                    idx.read_candidates(ev.container.store(), PRESENCE_KEY)
                })?;
                let label = self.index_label(attr, IndexType::Presence, "presence");
                self.record(filter, label.as_deref(), &set);
                Ok(set)
            }
            Filter::Substring {
                attr,
                initial,
                any,
                final_,
            } => {
                let length = self
                    .container
                    .attr_index(attr)
                    .map(|ai| ai.config().substring_length)
                    .unwrap_or(crate::config::DEFAULT_SUBSTRING_LENGTH);
                let mut keys = Vec::new();
                for fragment in initial.iter().chain(any.iter()).chain(final_.iter()) {
                    keys.extend(substring_assertion_keys(fragment, length));
                }
                keys.sort_unstable();
                keys.dedup();

                if keys.is_empty() {
                    // bare (attr=*...*) degenerates to presence
                    let out = self.lookup(attr, IndexType::Presence, |idx, ev| {
                        idx.read_candidates(ev.container.store(), PRESENCE_KEY)
                    })?;
                    let label = self.index_label(attr, IndexType::Presence, "presence");
                    self.record(filter, label.as_deref(), &out);
                    return Ok(out);
                }

                let mut out = EntryIdSet::undefined();
                for key in keys {
                    // a fragment shorter than the chunk size is a
                    // prefix of stored keys, not a stored key itself
                    let set = if key.len() < length {
                        let upper = prefix_upper_bound(&key);
                        self.lookup(attr, IndexType::Substring, |idx, ev| {
                            idx.range_candidates(
                                ev.container.store(),
                                Some(&key),
                                upper.as_deref(),
                                true,
                                false,
                            )
                        })?
                    } else {
                        self.lookup(attr, IndexType::Substring, |idx, ev| {
                            idx.read_candidates(ev.container.store(), &key)
                        })?
                    };
                    out = out.intersect(&set);
                    if out.is_empty() {
                        break;
                    }
                }
                let label = self.index_label(
                    attr,
                    IndexType::Substring,
                    &format!("substring.{}", length),
                );
                self.record(filter, label.as_deref(), &out);
                Ok(out)
            }
            Filter::GreaterOrEqual { attr, value } => {
                let key = equality_key(value);
                let set = self.lookup(attr, IndexType::Ordering, |idx, ev| {
                    idx.range_candidates(ev.container.store(), Some(&key), None, true, false)
                })?;
                let label = self.index_label(attr, IndexType::Ordering, "equality");
                self.record(filter, label.as_deref(), &set);
                Ok(set)
            }
            Filter::LessOrEqual { attr, value } => {
                let key = equality_key(value);
                let set = self.lookup(attr, IndexType::Ordering, |idx, ev| {
                    idx.range_candidates(ev.container.store(), None, Some(&key), true, true)
                })?;
                let label = self.index_label(attr, IndexType::Ordering, "equality");
                self.record(filter, label.as_deref(), &set);
                Ok(set)
            }
            Filter::Approximate { attr, value } => {
                let keys = crate::index::indexer::keys_for(
                    IndexType::Approximate,
                    &[value.clone()],
                    crate::config::DEFAULT_SUBSTRING_LENGTH,
                );
                let mut out = EntryIdSet::undefined();
                for key in keys {
                    let set = self.lookup(attr, IndexType::Approximate, |idx, ev| {
                        idx.read_candidates(ev.container.store(), &key)
                    })?;
                    out = out.intersect(&set);
                    if out.is_empty() {
                        break;
                    }
                }
                let label = self.index_label(attr, IndexType::Approximate, "approximate");
                self.record(filter, label.as_deref(), &out);
                Ok(out)
            }
        }
    }

    /// Trace label for a consulted index, `None` (printed as
    /// `index=none`) when the attribute has no index of that type.
    fn index_label(&self, attr: &str, ty: IndexType, id: &str) -> Option<String> {
        let ai = self.container.attr_index(attr)?;
        ai.index_for(ty)?;
        Some(format!("{}.{}", attr.to_ascii_lowercase(), id))
    }

    /// One budgeted index lookup. Undefined when the attribute has no
    /// index of the requested type or the budget is spent.
    fn lookup(
        &mut self,
        attr: &str,
        ty: IndexType,
        read: impl Fn(&crate::index::Index, &FilterEvaluator<'a>) -> Result<EntryIdSet>,
    ) -> Result<EntryIdSet> {
        let Some(ai) = self.container.attr_index(attr) else {
            return Ok(EntryIdSet::undefined());
        };
        let Some(idx) = ai.index_for(ty) else {
            return Ok(EntryIdSet::undefined());
        };
        if !self.take_budget() {
            return Ok(EntryIdSet::undefined());
        }
        read(idx, self)
    }
}

/// Smallest key strictly greater than every key with the given prefix, or
/// `None` when no such bound exists.
fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(&last) = upper.last() {
        if last < 0xFF {
            *upper.last_mut().unwrap() = last + 1;
            return Some(upper);
        }
        upper.pop();
    }
    None
}

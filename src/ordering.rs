//! Dispatch ordering of handler candidates
//!
//! Candidates are iterated most-specific event type first, ties broken by
//! method identity so iteration is reproducible. This order is used for
//! sorting only. Two candidates of equal rank are never merged: identity
//! lives in `HandlerDescriptor`'s `PartialEq`, and nothing here feeds a
//! sorted set or a dedup pass.

use crate::{HandlerDescriptor, MethodId};
use std::cmp::Ordering;

/// Sort key of a handler candidate for one event
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct HandlerRank<'a> {
    /// Index of the handler's event type in the event's hierarchy
    pub specificity: usize,
    /// Tiebreak for reproducible iteration
    pub method_id: &'a MethodId,
}

impl<'a> HandlerRank<'a> {
    /// Rank `descriptor` against `hierarchy`, `None` if it does not match
    pub fn of<S>(
        descriptor: &'a HandlerDescriptor<S>,
        hierarchy: &[&'static str],
    ) -> Option<Self> {
        descriptor.specificity(hierarchy).map(|specificity| Self {
            specificity,
            method_id: descriptor.method_id(),
        })
    }
}

/// Compare two matching candidates for dispatch order.
///
/// `Ordering::Equal` only says the two sort together; it does not make them
/// the same handler.
pub fn dispatch_order(a: &HandlerRank<'_>, b: &HandlerRank<'_>) -> Ordering {
    a.specificity
        .cmp(&b.specificity)
        .then_with(|| a.method_id.cmp(b.method_id))
}

/// Sort matching candidates in place. Stable, never drops entries.
pub fn sort_candidates<S>(candidates: &mut [(HandlerRank<'_>, &HandlerDescriptor<S>)]) {
    candidates.sort_by(|(a, _), (b, _)| dispatch_order(a, b));
}

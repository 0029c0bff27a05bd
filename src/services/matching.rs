//! Best-effort name matching between purchase-order lines and work-order
//! lines.
//!
//! The schema carries no foreign key between the two sides yet, so vendor
//! receipts locate the trading line they source by normalized item name.
//! The match lives behind [`NameMatcher`] so callers never see the string
//! heuristics and the seam can later be replaced by an explicit key.
//! When several candidates match the same name, the first in creation
//! order wins; each purchase-order line backfills at most one work-order
//! line.

/// Seam for item-name matching strategies.
pub trait NameMatcher: Send + Sync {
    /// True when `candidate` should be treated as naming the same item as
    /// `target`.
    fn matches(&self, target: &str, candidate: &str) -> bool;
}

/// Default matcher: lowercase, trim and collapse inner whitespace, then
/// accept equality or containment in either direction.
#[derive(Debug, Default, Clone, Copy)]
pub struct NormalizedNameMatcher;

pub fn normalize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl NameMatcher for NormalizedNameMatcher {
    fn matches(&self, target: &str, candidate: &str) -> bool {
        let target = normalize(target);
        let candidate = normalize(candidate);
        if target.is_empty() || candidate.is_empty() {
            return false;
        }
        target == candidate || target.contains(&candidate) || candidate.contains(&target)
    }
}

/// Finds the first element whose name matches `target`, in slice order.
pub fn find_first<'a, T>(
    matcher: &dyn NameMatcher,
    target: &str,
    candidates: &'a [T],
    name_of: impl Fn(&T) -> &str,
) -> Option<&'a T> {
    candidates.iter().find(|c| matcher.matches(target, name_of(c)))
}

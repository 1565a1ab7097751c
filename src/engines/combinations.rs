//! Legal Combinations
//!
//! Enumerates every subset of a rule universe that contains no mutually exclusive pair.

use crate::rules::catalog::RuleCatalog;

/// Iterator over the legal subsets of `universe`, as masks in ascending numeric order.
///
/// The empty set is always legal and is always yielded first.
#[derive(Debug, Clone)]
pub struct LegalCombinations<'c, 'a> {
    catalog: &'c RuleCatalog<'a>,
    universe: u64,
    next: Option<u64>,
}

impl<'c, 'a> LegalCombinations<'c, 'a> {
    /// Enumerate legal subsets of every rule in `catalog`.
    #[must_use]
    pub fn new(catalog: &'c RuleCatalog<'a>) -> Self {
        Self::within(catalog, catalog.full_mask())
    }

    /// Enumerate legal subsets of the rules in `universe`.
    #[must_use]
    pub fn within(catalog: &'c RuleCatalog<'a>, universe: u64) -> Self {
        LegalCombinations {
            catalog,
            universe: universe & catalog.full_mask(),
            next: Some(0),
        }
    }
}

impl Iterator for LegalCombinations<'_, '_> {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let current = self.next?;

            // Next submask of the universe in ascending order; wraps to zero after the last one.
            let following = (current | !self.universe).wrapping_add(1) & self.universe;
            self.next = (following != 0).then_some(following);

            if self.catalog.is_legal(current) {
                return Some(current);
            }
        }
    }
}

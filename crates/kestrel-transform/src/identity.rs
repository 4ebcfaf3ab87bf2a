//! Deterministic closure naming.
//!
//! Each named type owns a counter. Sites inside local and anonymous types
//! draw from the counter of the nearest named type around them, while the
//! name itself carries the full path of the type that contains the site.

use kestrel_hir::CompilationUnit;
use kestrel_types::ClassId;
use std::collections::HashMap;

/// Per-top-level-type naming state. Create one per lowered top-level type.
#[derive(Debug, Default)]
pub struct IdentityAllocator {
    counters: HashMap<ClassId, u32>,
}

impl IdentityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name for the next site found in `enclosing`, e.g. `Outer_1_$Lambda$3`.
    pub fn next(&mut self, unit: &CompilationUnit, enclosing: ClassId) -> String {
        let owner = unit.nearest_named(enclosing);
        let counter = self.counters.entry(owner).or_insert(0);
        *counter += 1;
        format!("{}_$Lambda${}", unit.qualified_path(enclosing), counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_hir::build::UnitBuilder;

    #[test]
    fn test_anonymous_sites_share_outer_counter() {
        let mut b = UnitBuilder::new("Ids");
        let x = b.class("X");
        let anon = b.anonymous_class(x, "1");
        let member = b.member_class(x, "M", true);
        let unit = b.finish();

        let mut ids = IdentityAllocator::new();
        assert_eq!(ids.next(&unit, x), "X_$Lambda$1");
        assert_eq!(ids.next(&unit, anon), "X_1_$Lambda$2");
        assert_eq!(ids.next(&unit, member), "X_M_$Lambda$1");
        assert_eq!(ids.next(&unit, x), "X_$Lambda$3");
    }
}

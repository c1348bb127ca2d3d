//
// source_index/symbols.rs
//
// Preprocessor symbol sets used as variant cache keys
//

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Immutable set of preprocessor symbol names.
///
/// Equality and hashing depend only on membership: two sets built from the
/// same names in a different order (or with duplicates) are the same key.
/// Cloning is an `Arc` bump, so sets can be shared freely between
/// references, variants and index keys.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SymbolSet {
    names: Arc<BTreeSet<String>>,
}

impl SymbolSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: Arc::new(names.into_iter().map(Into::into).collect()),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate names in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Return a new set that also contains `name`
    pub fn with(&self, name: &str) -> Self {
        if self.contains(name) {
            return self.clone();
        }
        let mut names = (*self.names).clone();
        names.insert(name.to_string());
        Self {
            names: Arc::new(names),
        }
    }

    /// Return a new set without `name`
    pub fn without(&self, name: &str) -> Self {
        if !self.contains(name) {
            return self.clone();
        }
        let mut names = (*self.names).clone();
        names.remove(name);
        Self {
            names: Arc::new(names),
        }
    }

    /// Union of both sets
    pub fn union(&self, other: &SymbolSet) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        Self::new(self.iter().chain(other.iter()))
    }
}

impl fmt::Debug for SymbolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names.iter()).finish()
    }
}

impl fmt::Display for SymbolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, name) in self.names.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", name)?;
        }
        write!(f, "}}")
    }
}

impl<S: Into<String>> FromIterator<S> for SymbolSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::hash_map::DefaultHasher;
    use std::collections::HashMap;
    use std::hash::{Hash, Hasher};

    fn hash_of(set: &SymbolSet) -> u64 {
        let mut hasher = DefaultHasher::new();
        set.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_order_independent_equality() {
        let a = SymbolSet::new(["DEBUG", "C64", "PAL"]);
        let b = SymbolSet::new(vec!["PAL".to_string(), "DEBUG".to_string(), "C64".to_string()]);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_duplicates_collapse() {
        let a = SymbolSet::new(["X", "X", "Y"]);
        let b = SymbolSet::new(["Y", "X"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_with_and_without_do_not_mutate() {
        let base = SymbolSet::new(["A"]);
        let added = base.with("B");
        assert!(!base.contains("B"));
        assert!(added.contains("B"));

        let removed = added.without("A");
        assert!(added.contains("A"));
        assert_eq!(removed, SymbolSet::new(["B"]));
    }

    #[test]
    fn test_map_lookup_across_constructions() {
        let mut map = HashMap::new();
        map.insert(SymbolSet::new(["B", "A"]), 1);
        assert_eq!(map.get(&SymbolSet::empty().with("A").with("B")), Some(&1));
    }

    #[test]
    fn test_display_sorted() {
        let set = SymbolSet::new(["ZP", "BANK"]);
        assert_eq!(set.to_string(), "{BANK, ZP}");
        assert_eq!(SymbolSet::empty().to_string(), "{}");
    }

    proptest! {
        #[test]
        fn prop_permutations_hit_same_key(
            names in prop::collection::vec("[A-Z][A-Z0-9_]{0,6}", 0..8),
            seed in 0usize..64,
        ) {
            let mut shuffled = names.clone();
            // Deterministic rotation + reverse stands in for a shuffle
            if !shuffled.is_empty() {
                let len = shuffled.len();
                shuffled.rotate_left(seed % len);
            }
            shuffled.reverse();

            let a = SymbolSet::new(names.clone());
            let b = SymbolSet::new(shuffled);
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(hash_of(&a), hash_of(&b));
        }
    }
}

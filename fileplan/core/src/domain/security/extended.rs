// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::node::PropertyValue;

/// Reference-counted multiset of authority names.
///
/// The same authority can reach a node through several paths (directly, from a
/// child record, from a rendition source). Each path adds one reference and
/// removal only drops the authority once its count reaches zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedAuthorities {
    counts: BTreeMap<String, u32>,
}

impl ExtendedAuthorities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_property(value: Option<&PropertyValue>) -> Self {
        let counts = value
            .and_then(PropertyValue::as_authority_counts)
            .cloned()
            .unwrap_or_default();
        Self { counts }
    }

    pub fn to_property(&self) -> PropertyValue {
        PropertyValue::AuthorityCounts(self.counts.clone())
    }

    pub fn add(&mut self, authority: &str) {
        *self.counts.entry(authority.to_string()).or_insert(0) += 1;
    }

    /// Drop one reference. Returns true when the authority left the set.
    pub fn remove(&mut self, authority: &str) -> bool {
        match self.counts.get_mut(authority) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.counts.remove(authority);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, authority: &str) -> bool {
        self.counts.contains_key(authority)
    }

    pub fn count(&self, authority: &str) -> u32 {
        self.counts.get(authority).copied().unwrap_or(0)
    }

    pub fn authorities(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_add_twice_remove_once_keeps_authority() {
        let mut readers = ExtendedAuthorities::new();
        readers.add("GROUP_finance");
        readers.add("GROUP_finance");

        assert!(!readers.remove("GROUP_finance"));
        assert!(readers.contains("GROUP_finance"));

        assert!(readers.remove("GROUP_finance"));
        assert!(readers.is_empty());
    }

    #[test]
    fn test_remove_unknown_authority_is_noop() {
        let mut readers = ExtendedAuthorities::new();
        readers.add("bob");
        assert!(!readers.remove("alice"));
        assert_eq!(readers.count("bob"), 1);
    }

    #[test]
    fn test_property_round_trip_preserves_counts() {
        let mut writers = ExtendedAuthorities::new();
        writers.add("alice");
        writers.add("alice");
        let restored = ExtendedAuthorities::from_property(Some(&writers.to_property()));
        assert_eq!(restored.count("alice"), 2);
    }

    proptest! {
        #[test]
        fn prop_balanced_add_remove_empties_set(
            ops in proptest::collection::vec(("[a-c]", 1u32..4), 1..12)
        ) {
            let mut set = ExtendedAuthorities::new();
            for (authority, times) in &ops {
                for _ in 0..*times {
                    set.add(authority);
                }
            }
            for (authority, times) in &ops {
                for _ in 0..*times {
                    prop_assert!(set.contains(authority));
                    set.remove(authority);
                }
            }
            prop_assert!(set.is_empty());
        }
    }
}

//! Item multiset carried by an agent.
//!
//! Items are free-form names proposed by the oracle, so every name is
//! normalized before it touches the map: `"Loaf of Bread "` and
//! `"loaf_of_bread"` are the same item. Arithmetic is checked; counts
//! never overflow and never go below zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Canonical form of an item name: trimmed, lowercase, words joined by `_`.
pub fn normalize_item(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Human-readable form of a normalized item name.
pub fn display_item(id: &str) -> String {
    id.replace('_', " ")
}

/// Item name to count. Entries never hold zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    items: BTreeMap<String, u32>,
}

impl Inventory {
    /// Create an empty inventory.
    pub const fn new() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }

    /// How many of `item` are held.
    pub fn count(&self, item: &str) -> u32 {
        self.items.get(&normalize_item(item)).copied().unwrap_or(0)
    }

    /// Add `quantity` of `item`.
    pub fn add(&mut self, item: &str, quantity: u32) -> Result<u32, AgentError> {
        let key = normalize_item(item);
        let entry = self.items.entry(key).or_insert(0);
        *entry = entry
            .checked_add(quantity)
            .ok_or_else(|| AgentError::ArithmeticOverflow {
                context: format!("inventory count for {item}"),
            })?;
        Ok(*entry)
    }

    /// Remove `quantity` of `item`, dropping the entry when it reaches zero.
    pub fn remove(&mut self, item: &str, quantity: u32) -> Result<u32, AgentError> {
        let key = normalize_item(item);
        let available = self.items.get(&key).copied().unwrap_or(0);
        let remaining = available
            .checked_sub(quantity)
            .ok_or_else(|| AgentError::MissingItem {
                item: key.clone(),
                requested: quantity,
                available,
            })?;
        if remaining == 0 {
            self.items.remove(&key);
        } else {
            self.items.insert(key, remaining);
        }
        Ok(remaining)
    }

    /// Whether nothing is held.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate over `(normalized name, count)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.items.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Comma-separated listing for prompts, e.g. `"bread x2, rope"`.
    pub fn describe(&self) -> String {
        if self.items.is_empty() {
            return "nothing".to_owned();
        }
        self.items
            .iter()
            .map(|(name, count)| {
                if *count == 1 {
                    display_item(name)
                } else {
                    format!("{} x{count}", display_item(name))
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn names_are_normalized() {
        assert_eq!(normalize_item("  Loaf of  Bread "), "loaf_of_bread");
        let mut inv = Inventory::new();
        assert_eq!(inv.add("Loaf of Bread", 2), Ok(2));
        assert_eq!(inv.count("loaf of bread"), 2);
    }

    #[test]
    fn remove_to_zero_drops_entry() {
        let mut inv = Inventory::new();
        inv.add("rope", 1).unwrap();
        assert_eq!(inv.remove("rope", 1), Ok(0));
        assert!(inv.is_empty());
    }

    #[test]
    fn remove_more_than_held_fails() {
        let mut inv = Inventory::new();
        inv.add("apple", 1).unwrap();
        let err = inv.remove("apple", 3);
        assert_eq!(
            err,
            Err(AgentError::MissingItem {
                item: "apple".to_owned(),
                requested: 3,
                available: 1,
            })
        );
        assert_eq!(inv.count("apple"), 1);
    }

    #[test]
    fn describe_lists_counts() {
        let mut inv = Inventory::new();
        inv.add("bread", 2).unwrap();
        inv.add("fishing rod", 1).unwrap();
        assert_eq!(inv.describe(), "bread x2, fishing rod");
        assert_eq!(Inventory::new().describe(), "nothing");
    }
}

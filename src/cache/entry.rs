//! Cache Keys
//!
//! Keys are scoped by request class so a search for "7" and a lookup of item 7
//! never collide.

use serde::{Serialize, Serializer};

use crate::domain::ItemId;

/// Key of a cached upstream response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Result of an item-type search
    Search(String),
    /// Result of a single-item lookup
    Lookup(ItemId),
}

impl CacheKey {
    /// Whether this key caches an item-type search.
    pub fn is_search(&self) -> bool {
        matches!(self, CacheKey::Search(_))
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Search(item_type) => write!(f, "search:{}", item_type),
            CacheKey::Lookup(id) => write!(f, "lookup:{}", id),
        }
    }
}

// Keys appear as JSON object keys in the diagnostics listing.
impl Serialize for CacheKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        assert_eq!(CacheKey::Search("book".into()).to_string(), "search:book");
        assert_eq!(CacheKey::Lookup(ItemId(7)).to_string(), "lookup:7");
    }

    #[test]
    fn test_keys_do_not_collide_across_classes() {
        assert_ne!(CacheKey::Search("7".into()), CacheKey::Lookup(ItemId(7)));
    }

    #[test]
    fn test_key_serializes_as_string() {
        let json = serde_json::to_string(&CacheKey::Lookup(ItemId(3))).unwrap();
        assert_eq!(json, r#""lookup:3""#);
    }
}

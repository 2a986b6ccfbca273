//! Saved BBS addresses

use crate::storage::{self, KeyValueStore};
use anyhow::Result;

/// Key the favorites list is persisted under
pub const FAVORITES_KEY: &str = "favorites";

/// Ordered list of unique, non-blank addresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Favorites {
    addresses: Vec<String>,
}

impl Favorites {
    /// Load from `store`; missing or malformed data is an empty list
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let stored: Vec<String> = match storage::load_json(store, FAVORITES_KEY) {
            Ok(Some(addresses)) => addresses,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read favorites: {:#}", e);
                Vec::new()
            }
        };

        let mut favorites = Self::default();
        for address in stored {
            favorites.add(&address);
        }
        favorites
    }

    pub fn save(&self, store: &mut dyn KeyValueStore) -> Result<()> {
        storage::save_json(store, FAVORITES_KEY, &self.addresses)
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Add a trimmed address; blanks and duplicates are ignored
    pub fn add(&mut self, address: &str) -> bool {
        let address = address.trim();
        if address.is_empty() || self.addresses.iter().any(|a| a == address) {
            return false;
        }
        self.addresses.push(address.to_string());
        true
    }

    pub fn remove(&mut self, address: &str) -> bool {
        let address = address.trim();
        let before = self.addresses.len();
        self.addresses.retain(|a| a != address);
        self.addresses.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_add_rejects_blank_and_duplicate() {
        let mut favorites = Favorites::default();
        assert!(favorites.add(" bbs.example.com "));
        assert!(!favorites.add("bbs.example.com"));
        assert!(!favorites.add("   "));
        assert_eq!(favorites.addresses(), &["bbs.example.com".to_string()]);
    }

    #[test]
    fn test_remove() {
        let mut favorites = Favorites::default();
        favorites.add("a.example");
        favorites.add("b.example");
        assert!(favorites.remove("a.example"));
        assert!(!favorites.remove("a.example"));
        assert_eq!(favorites.addresses()[0], "b.example");
    }

    #[test]
    fn test_persist_and_reload() {
        let mut store = MemoryStore::new();
        let mut favorites = Favorites::default();
        favorites.add("bbs.example.com:23");
        favorites.add("retro.example.net");
        favorites.save(&mut store).unwrap();

        assert_eq!(Favorites::load(&store), favorites);
    }

    #[test]
    fn test_load_cleans_stored_list() {
        let mut store = MemoryStore::new();
        store
            .set(FAVORITES_KEY, "[\"a.example\", \" a.example \", \"\"]")
            .unwrap();
        assert_eq!(Favorites::load(&store).addresses(), &["a.example".to_string()]);
    }
}

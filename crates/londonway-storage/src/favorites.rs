//! Favorite journeys, persisted as one JSON array under a single key.

use std::sync::Arc;

use tracing::{info, warn};

use londonway_core::error::LondonWayError;
use londonway_core::types::FavoriteJourney;

use crate::kv::KeyValueStore;

/// Storage key for the favorites list.
pub const FAVORITES_KEY: &str = "londonway_favorites_v2";

/// Read the stored favorites list.
///
/// A missing key or a value that does not decode as the current schema
/// yields an empty list; only store failures are errors.
pub fn read_favorites(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Vec<FavoriteJourney>, LondonWayError> {
    let Some(raw) = store.get(key)? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Vec<FavoriteJourney>>(&raw) {
        Ok(items) => Ok(items),
        Err(e) => {
            warn!(key, error = %e, "Stored favorites do not match schema; starting empty");
            Ok(Vec::new())
        }
    }
}

/// Overwrite the stored favorites list.
pub fn write_favorites(
    store: &dyn KeyValueStore,
    key: &str,
    items: &[FavoriteJourney],
) -> Result<(), LondonWayError> {
    let json = serde_json::to_string(items)?;
    store.set(key, &json)
}

/// In-memory favorites list mirrored to a [`KeyValueStore`].
///
/// Loaded once at startup; every mutation writes the full list back.
pub struct FavoritesBook {
    store: Arc<dyn KeyValueStore>,
    key: String,
    items: Vec<FavoriteJourney>,
}

impl FavoritesBook {
    /// Load the book from `store` under `key`.
    pub fn load(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Result<Self, LondonWayError> {
        let key = key.into();
        let items = read_favorites(store.as_ref(), &key)?;
        info!(count = items.len(), "Favorites loaded");
        Ok(Self { store, key, items })
    }

    /// All favorites in creation order.
    pub fn list(&self) -> &[FavoriteJourney] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&FavoriteJourney> {
        self.items.iter().find(|f| f.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append a favorite and persist the list.
    ///
    /// On a store failure the in-memory list is left unchanged.
    pub fn add(&mut self, favorite: FavoriteJourney) -> Result<&FavoriteJourney, LondonWayError> {
        self.items.push(favorite);
        if let Err(e) = write_favorites(self.store.as_ref(), &self.key, &self.items) {
            self.items.pop();
            return Err(e);
        }
        let added = &self.items[self.items.len() - 1];
        info!(id = %added.id, label = %added.label, "Favorite saved");
        Ok(added)
    }

    /// Remove a favorite by id and persist the list.
    ///
    /// Returns `None` if no favorite has that id.
    pub fn remove(&mut self, id: &str) -> Result<Option<FavoriteJourney>, LondonWayError> {
        let Some(pos) = self.items.iter().position(|f| f.id == id) else {
            return Ok(None);
        };
        let removed = self.items.remove(pos);
        if let Err(e) = write_favorites(self.store.as_ref(), &self.key, &self.items) {
            self.items.insert(pos, removed);
            return Err(e);
        }
        info!(id = %removed.id, "Favorite removed");
        Ok(Some(removed))
    }
}

impl std::fmt::Debug for FavoritesBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FavoritesBook")
            .field("key", &self.key)
            .field("items", &self.items)
            .finish()
    }
}

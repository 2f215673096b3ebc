//! LondonWay storage crate - key-value persistence and favorite journeys.
//!
//! Provides a WAL-mode SQLite key-value store with migrations, an in-memory
//! store for tests, and the favorites book that is loaded once at startup
//! and written back in full on every mutation.

pub mod db;
pub mod favorites;
pub mod kv;
pub mod migrations;

pub use db::Database;
pub use favorites::{FavoritesBook, FAVORITES_KEY};
pub use kv::{KeyValueStore, MemoryStore};

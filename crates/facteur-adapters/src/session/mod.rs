//! Session persistence.

pub mod redb_store;

pub use redb_store::RedbSessionStore;

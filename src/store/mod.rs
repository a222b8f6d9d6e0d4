//! The snapshot store: entity types, SQLite schema, and the repository
//! that upserts/reads them.

pub mod entities;
pub mod repository;
pub mod schema;

pub use entities::*;
pub use repository::SnapshotStore;

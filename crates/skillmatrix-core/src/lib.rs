//! Core types for the skill matrix store.
//!
//! This crate holds the domain graph (groups, categories, skills, users), the
//! change notifier observers subscribe to, and the versioned migration engine
//! that prepares a backing store. It is free of database drivers: everything
//! that touches storage goes through the [`backend::Backend`] trait, which
//! adapters such as `skillmatrix-store-sqlite` implement.

pub mod backend;
pub mod entity;
pub mod entity_store;
pub mod error;
pub mod graph;
pub mod id;
pub mod migration;
pub mod notify;
pub mod schema;

pub use error::{Error, Result};
pub use graph::{DomainGraph, GraphConfig};
pub use migration::{MigrationEngine, MigrationRecord, MigrationUnit, Version};
pub use notify::{ChangeNotifier, Topic};

#[cfg(test)]
mod testing;

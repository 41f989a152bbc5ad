//! Profile document store boundary.
//!
//! This module defines the persistence abstraction the profile store runs on
//! and its two backends: in-memory (tests/dev) and Postgres.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryProfileStore;
pub use postgres::PostgresProfileStore;
pub use r#trait::{
    DeleteResult, DocumentStoreError, OptionAssignment, ProfileDocumentStore, ProfilePatch,
    UpdateResult,
};

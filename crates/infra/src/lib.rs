//! Infrastructure layer: profile persistence, collaborator boundaries, and the
//! caller-facing profile store and cart option resolver.

pub mod backend;
pub mod cart_options;
pub mod config;
pub mod document_store;
pub mod profile_store;
pub mod services;


pub use cart_options::CartOptionResolver;
pub use config::{ConfigError, InfraConfig};
pub use profile_store::{ProfileStore, ProfileStoreError, ProfileStoreResult};

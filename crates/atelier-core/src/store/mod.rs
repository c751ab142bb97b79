//! Persistence layer.
//!
//! One `Store` over SQLite holds every record shared across tasks:
//! pipeline items, concepts, validation requests, tech packs, and the
//! append-only event audit trail.

pub mod store;
pub(crate) mod types;

pub use store::Store;

#[cfg(test)]
mod tests;

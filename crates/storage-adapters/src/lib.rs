//! newsroom/crates/storage-adapters/src/lib.rs
//!
//! `DocumentBackend` implementations. Pick one at startup; the pipeline only
//! sees the trait.

pub mod file;
pub mod memory;
#[cfg(feature = "db-postgres")]
pub mod postgres;

pub use file::FileBackend;
pub use memory::InMemoryBackend;
#[cfg(feature = "db-postgres")]
pub use postgres::PgBackend;

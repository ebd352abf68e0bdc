//! Storage layer for conductor-daemon
//!
//! A generic row store ([`StoreClient`]) with three backends, and the
//! typed [`Records`] repository the business components use.

mod memory;
mod postgres;
mod records;
mod rest;
mod traits;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use records::{from_row, to_row, Records};
pub use rest::RestStore;
pub use traits::*;

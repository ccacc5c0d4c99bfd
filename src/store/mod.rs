//! External order record store access.

pub mod client;

pub use client::{OrderStoreClient, StoreError, StoreResult};

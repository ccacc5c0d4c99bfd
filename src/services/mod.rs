//! Services module for reconciliation logic.

pub mod reconciler;

pub use reconciler::{CallbackAuthConfig, CallbackError, Reconciler};

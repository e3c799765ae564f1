//! Provider error types.
//!
//! The error enum lives in `eduplanner-core` so the iteration loop can
//! classify failures; it is re-exported here for provider implementations.

pub use eduplanner_core::error::{is_connectivity_error, ProviderError};

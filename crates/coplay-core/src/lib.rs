//! Core coplay primitives shared across crates.
//!
//! Includes client/instance identities, peer keys, inflight ids, session
//! credentials, and base errors.

pub mod error;
pub mod types;

pub use error::CoreError;
pub use types::{ClientId, ClientKey, InflightId, InstanceId, SessionDescriptor};

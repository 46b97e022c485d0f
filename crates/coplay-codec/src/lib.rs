//! coplay wire codec.
//!
//! Defines the `RemotePlayEvent` schema and its JSON text-frame encoding.

pub mod error;
pub mod event;
pub mod frame;

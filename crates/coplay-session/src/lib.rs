//! Shared-session client: transport state machine, action relay, and inflight
//! reconciliation.
//!
//! [`transport::SessionTransport`] owns the connection and sequence counter,
//! [`relay::ActionRelay`] decides what gets relayed and folds peers' events in,
//! and [`store::Store`] keeps canonical state behind the speculative view.

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod ledger;
pub mod relay;
pub mod sink;
pub mod store;
pub mod transport;

pub use client::RemotePlayClient;
pub use config::SessionConfig;
pub use error::RelayError;
pub use relay::{ActionRegistry, ActionRelay, Dispatch, LocalDispatch};
pub use sink::EventSink;
pub use store::Store;
pub use transport::{SessionState, SessionTransport};

//! Connection seam between the session state machine and concrete links.
//!
//! A [`link::SessionConnector`] opens one [`link::SessionLink`] per connection
//! attempt; links are never reused across reconnects.

pub mod link;
pub mod memory;
pub mod url;

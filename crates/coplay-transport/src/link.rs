use thiserror::Error;

/// Close code for an intentional, clean shutdown. No reconnect follows.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when a connection drops without a close handshake.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Returns whether `code` ends a session without scheduling a reconnect.
pub fn is_normal_closure(code: u16) -> bool {
    code == CLOSE_NORMAL
}

/// Link-level failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    /// Link is closed or its worker has exited.
    #[error("link is closed")]
    Closed,
    /// Outbound queue is full.
    #[error("outbound queue is full")]
    QueueFull,
    /// Connection could not be started.
    #[error("connect failed: {0}")]
    Connect(String),
}

/// Connection lifecycle notifications, in the order the link observed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Handshake completed; frames may flow.
    Opened,
    /// One inbound text frame.
    Frame(String),
    /// Socket-level error. A `Closed` event follows.
    Error(String),
    /// Connection ended with `code`.
    Closed { code: u16, reason: String },
}

/// One live duplex text connection.
pub trait SessionLink {
    /// Queues a text frame for best-effort delivery.
    fn send_text(&mut self, frame: &str) -> Result<(), LinkError>;
    /// Returns the next lifecycle/frame event without blocking.
    fn poll_event(&mut self) -> Option<LinkEvent>;
    /// Starts a close handshake with `code`.
    fn close(&mut self, code: u16);
}

/// Factory for fresh links; called once per connection attempt.
pub trait SessionConnector {
    type Link: SessionLink;

    /// Starts connecting to `url`. The returned link reports `Opened` once the
    /// handshake completes.
    fn open(&mut self, url: &str) -> Result<Self::Link, LinkError>;
}

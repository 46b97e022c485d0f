use thiserror::Error;

/// Errors returned by frame decoding.
///
/// Every variant is non-fatal for a session: the frame is dropped.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Frame is not valid JSON or does not match the event schema.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),
    /// Frame parsed but violates an event-level rule.
    #[error("invalid event: {0}")]
    InvalidEvent(&'static str),
}

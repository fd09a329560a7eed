//! RPC transport errors.

use thiserror::Error;

/// Failures raised by the RPC transport.
#[derive(Debug, Error)]
pub enum RpcError {
    /// connecting to, or declaring topology on, the broker failed
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),
    /// the envelope failed to sign, verify, or (de)serialize
    #[error("envelope error: {0}")]
    Envelope(#[from] envelope_codec::EnvelopeError),
    /// no handler is registered for the task name the message carried
    #[error("no handler registered for task {0:?}")]
    UnknownTask(String),
    /// the handler itself returned an error; the message is nacked and
    /// redelivered
    #[error("task handler failed: {0}")]
    Handler(#[from] anyhow::Error),
}

//! Envelope codec errors.

use thiserror::Error;

/// Failures raised while serializing or deserializing an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// the header JSON was malformed or missing a required key
    #[error("invalid envelope header: {0}")]
    InvalidHeader(String),
    /// the signer named in the header is not in the trusted key set
    #[error("unknown signer: {0}")]
    UnknownSigner(String),
    /// signature verification over the body failed
    #[error("signature verification failed")]
    BadSignature,
    /// the envelope's `content_type` is not in the caller's accept set
    #[error("content type not accepted: {0}")]
    ContentDisallowed(String),
    /// the body's first byte is ASCII whitespace, which would make
    /// header/body delimiting ambiguous
    #[error("body begins with ASCII whitespace")]
    LeadingWhitespace,
    /// a `content_encoding` name not understood by this codec
    #[error("unknown content encoding: {0}")]
    UnknownEncoding(String),
    /// base64 armored body failed to decode
    #[error("failed to decode armored body: {0}")]
    Armor(#[from] base64::DecodeError),
    /// JSON (de)serialization failure, either of the header or of a
    /// `application/json` payload
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

//! The inner serializer: `raw` carries opaque bytes, `json` carries a
//! `serde_json::Value`. Named after the source's `kombu` serializer
//! registry, reduced to the two entries this system actually uses.

use crate::error::EnvelopeError;

/// A payload, tagged with which inner serializer produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// opaque bytes, carried as-is
    Raw(Vec<u8>),
    /// a JSON value
    Json(serde_json::Value),
}

impl Payload {
    /// the `content_type` recorded in the envelope header
    pub fn content_type(&self) -> &'static str {
        match self {
            Payload::Raw(_) => "application/data",
            Payload::Json(_) => "application/json",
        }
    }

    /// serialize to the bytes that get signed (before body encoding)
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        match self {
            Payload::Raw(bytes) => Ok(bytes.clone()),
            Payload::Json(value) => Ok(serde_json::to_vec(value)?),
        }
    }

    /// parse bytes back into a payload, given the envelope's `content_type`
    pub fn from_bytes(content_type: &str, bytes: &[u8]) -> Result<Self, EnvelopeError> {
        match content_type {
            "application/json" => Ok(Payload::Json(serde_json::from_slice(bytes)?)),
            _ => Ok(Payload::Raw(bytes.to_vec())),
        }
    }
}

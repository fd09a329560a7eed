//! Body encodings: `raw` keeps the inner-serialized bytes verbatim,
//! `armored` base64-encodes them so the envelope is safe to carry over
//! channels that mangle binary data.

use base64::Engine;

use crate::error::EnvelopeError;

/// How the body is framed after inner serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// body bytes are carried verbatim
    Raw,
    /// body bytes are base64-encoded
    Armored,
}

impl Encoding {
    /// the name written into the header's `content_encoding` field
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Raw => "raw",
            Encoding::Armored => "armored",
        }
    }

    /// parse a `content_encoding` header value
    pub fn parse(name: &str) -> Result<Self, EnvelopeError> {
        match name {
            "raw" => Ok(Encoding::Raw),
            "armored" => Ok(Encoding::Armored),
            other => Err(EnvelopeError::UnknownEncoding(other.to_owned())),
        }
    }

    /// frame inner-serialized bytes into the wire body
    pub fn encode(self, body: &[u8]) -> Vec<u8> {
        match self {
            Encoding::Raw => body.to_vec(),
            Encoding::Armored => base64::engine::general_purpose::STANDARD
                .encode(body)
                .into_bytes(),
        }
    }

    /// recover the inner-serialized bytes from a wire body
    pub fn decode(self, wire_body: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        match self {
            Encoding::Raw => Ok(wire_body.to_vec()),
            Encoding::Armored => Ok(base64::engine::general_purpose::STANDARD.decode(wire_body)?),
        }
    }
}

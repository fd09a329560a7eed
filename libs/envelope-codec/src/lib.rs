//! # envelope-codec
//!
//! An ed25519-signed message envelope: a JSON header followed by
//! whitespace then a raw body, the direct Rust analogue of the source's
//! `ED25519Serializer` (which layers `nacl.signing` over `kombu`'s
//! serializer registry). `ed25519-dalek` replaces `nacl.signing`;
//! `serde_json` replaces the header's `json` dependency; `base64`
//! replaces the armored-body encoding.
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

mod codec;
mod encoding;
mod error;
mod payload;

pub use codec::EnvelopeCodec;
pub use encoding::Encoding;
pub use error::EnvelopeError;
pub use payload::Payload;

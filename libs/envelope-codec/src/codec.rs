//! Envelope serialize/deserialize.

use std::collections::HashMap;

use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::encoding::Encoding;
use crate::error::EnvelopeError;
use crate::payload::Payload;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    signature: String,
    signer: String,
    content_type: String,
    content_encoding: String,
}

/// Signs outgoing envelopes with one key and verifies incoming ones
/// against a trusted set, keyed by the base64 verify key recorded in
/// the header's `signer` field -- mirroring the source's `_verify_keys`
/// lookup table.
#[derive(Debug)]
pub struct EnvelopeCodec {
    signing_key: SigningKey,
    signer_b64: String,
    encoding: Encoding,
    trusted: HashMap<String, VerifyingKey>,
}

impl EnvelopeCodec {
    /// Build a codec that signs with `signing_key` and verifies against
    /// `trusted` (signer base64 -> verify key; the signer's own key
    /// should be included if it must also accept its own envelopes).
    pub fn new(
        signing_key: SigningKey,
        encoding: Encoding,
        trusted: HashMap<String, VerifyingKey>,
    ) -> Self {
        let signer_b64 =
            base64::engine::general_purpose::STANDARD.encode(signing_key.verifying_key().as_bytes());
        Self {
            signing_key,
            signer_b64,
            encoding,
            trusted,
        }
    }

    /// this codec's own signer identity, as written into headers it produces
    pub fn signer(&self) -> &str {
        &self.signer_b64
    }

    /// Serialize `payload`: inner-serialize, encode, sign, frame.
    pub fn serialize(&self, payload: &Payload) -> Result<Vec<u8>, EnvelopeError> {
        let inner_bytes = payload.to_bytes()?;
        let body = self.encoding.encode(&inner_bytes);

        if self.encoding == Encoding::Raw {
            if let Some(&first) = body.first() {
                if first.is_ascii_whitespace() {
                    return Err(EnvelopeError::LeadingWhitespace);
                }
            }
        }

        let signature: Signature = self.signing_key.sign(&body);

        let header = Header {
            signature: base64::engine::general_purpose::STANDARD.encode(signature.to_bytes()),
            signer: self.signer_b64.clone(),
            content_type: payload.content_type().to_owned(),
            content_encoding: self.encoding.name().to_owned(),
        };

        let mut out = serde_json::to_vec(&header)?;
        out.push(b'\n');
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Deserialize a framed envelope, accepting only payloads whose
    /// `content_type` is in `accept`.
    pub fn deserialize(&self, data: &[u8], accept: &[&str]) -> Result<Payload, EnvelopeError> {
        let mut stream = serde_json::Deserializer::from_slice(data).into_iter::<Header>();
        let header = stream
            .next()
            .ok_or_else(|| EnvelopeError::InvalidHeader("empty input".into()))?
            .map_err(|e| EnvelopeError::InvalidHeader(e.to_string()))?;
        let consumed = stream.byte_offset();

        let mut rest = &data[consumed..];
        while let Some(&b) = rest.first() {
            if b.is_ascii_whitespace() {
                rest = &rest[1..];
            } else {
                break;
            }
        }
        let body = rest;

        let verify_key = self
            .trusted
            .get(&header.signer)
            .ok_or_else(|| EnvelopeError::UnknownSigner(header.signer.clone()))?;

        let sig_bytes = base64::engine::general_purpose::STANDARD
            .decode(&header.signature)
            .map_err(|_| EnvelopeError::BadSignature)?;
        let signature =
            Signature::try_from(sig_bytes.as_slice()).map_err(|_| EnvelopeError::BadSignature)?;
        verify_key
            .verify(body, &signature)
            .map_err(|_| EnvelopeError::BadSignature)?;

        if !accept.contains(&header.content_type.as_str()) {
            return Err(EnvelopeError::ContentDisallowed(header.content_type));
        }

        let encoding = Encoding::parse(&header.content_encoding)?;
        let inner_bytes = encoding.decode(body)?;
        Payload::from_bytes(&header.content_type, &inner_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use proptest::prelude::*;
    use rand::rngs::OsRng;

    fn codec_pair(encoding: Encoding) -> (EnvelopeCodec, EnvelopeCodec) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verify_key = signing_key.verifying_key();
        let signer_b64 =
            base64::engine::general_purpose::STANDARD.encode(verify_key.as_bytes());

        let mut trusted = HashMap::new();
        trusted.insert(signer_b64.clone(), verify_key);

        let sender = EnvelopeCodec::new(signing_key.clone(), encoding, trusted.clone());
        let receiver = EnvelopeCodec::new(SigningKey::generate(&mut OsRng), encoding, trusted);
        (sender, receiver)
    }

    #[test]
    fn round_trips_raw_payload() {
        let (codec, _) = codec_pair(Encoding::Raw);
        let payload = Payload::Raw(b"hello".to_vec());
        let wire = codec.serialize(&payload).unwrap();
        let decoded = codec.deserialize(&wire, &["application/data"]).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn round_trips_armored_json_payload() {
        let (codec, _) = codec_pair(Encoding::Armored);
        let payload = Payload::Json(serde_json::json!({"task": "refresh", "force": true}));
        let wire = codec.serialize(&payload).unwrap();
        let decoded = codec.deserialize(&wire, &["application/json"]).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn rejects_unknown_signer() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let codec = EnvelopeCodec::new(signing_key, Encoding::Raw, HashMap::new());
        let wire = codec.serialize(&Payload::Raw(b"x".to_vec())).unwrap();
        let err = codec.deserialize(&wire, &["application/data"]).unwrap_err();
        assert!(matches!(err, EnvelopeError::UnknownSigner(_)));
    }

    #[test]
    fn rejects_disallowed_content_type() {
        let (codec, _) = codec_pair(Encoding::Raw);
        let wire = codec
            .serialize(&Payload::Json(serde_json::json!(1)))
            .unwrap();
        let err = codec.deserialize(&wire, &["application/data"]).unwrap_err();
        assert!(matches!(err, EnvelopeError::ContentDisallowed(_)));
    }

    proptest! {
        #[test]
        fn signature_rejects_any_single_bit_flip(bytes in prop::collection::vec(any::<u8>(), 1..64), bit in 0u32..8) {
            let (codec, _) = codec_pair(Encoding::Armored);
            let payload = Payload::Raw(bytes);
            let mut wire = codec.serialize(&payload).unwrap();
            let newline = wire.iter().position(|&b| b == b'\n').unwrap();
            // flip a bit strictly inside the body, never the header.
            if wire.len() > newline + 1 {
                let idx = newline + 1 + (bit as usize % (wire.len() - newline - 1));
                wire[idx] ^= 1 << (bit % 8);
                let err = codec.deserialize(&wire, &["application/data"]);
                prop_assert!(err.is_err());
            }
        }
    }
}

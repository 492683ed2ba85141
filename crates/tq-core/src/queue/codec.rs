//! PayloadCodec - application values <-> wire payload strings.
//!
//! This is the only place where payloads cross to transport form. Any
//! JSON-representable value (null, nested maps and sequences included)
//! must survive `decode(encode(v)) == v`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use serde::Serialize;
use serde_json::Value;

use crate::error::TqError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PayloadCodec {
    /// Canonical JSON text.
    #[default]
    Json,

    /// URL-safe base64 of the JSON text, for services whose payload field is
    /// declared as bytes.
    Base64Json,
}

impl PayloadCodec {
    pub fn encode<T: Serialize + ?Sized>(&self, payload: &T) -> Result<String, TqError> {
        let json = serde_json::to_string(payload)?;
        Ok(match self {
            PayloadCodec::Json => json,
            PayloadCodec::Base64Json => URL_SAFE.encode(json),
        })
    }

    pub fn decode(&self, wire: &str) -> Result<Value, TqError> {
        match self {
            PayloadCodec::Json => Ok(serde_json::from_str(wire)?),
            PayloadCodec::Base64Json => {
                let bytes = URL_SAFE.decode(wire)?;
                Ok(serde_json::from_slice(&bytes)?)
            }
        }
    }
}

//! Serialization boundary between typed values and the byte-oriented remote tier.
//!
//! The local tier stores values with their static type. Everything that
//! crosses into the remote tier goes through [`Codec`] and nowhere else.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// MessagePack encoding of `nil`.
const MSGPACK_NIL: u8 = 0xc0;

/// Wire format used for remote tier values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecFormat {
    /// UTF-8 JSON via `serde_json`.
    #[default]
    Json,
    /// MessagePack via `rmp-serde`, struct fields encoded by name.
    #[serde(alias = "msgpack")]
    MessagePack,
}

impl CodecFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::MessagePack => "messagepack",
        }
    }
}

/// Errors raised while encoding or decoding remote tier values.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MessagePack encode error: {0}")]
    MessagePackEncode(#[from] rmp_serde::encode::Error),

    #[error("MessagePack decode error: {0}")]
    MessagePackDecode(#[from] rmp_serde::decode::Error),
}

/// Encodes typed values to bytes and back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Codec {
    format: CodecFormat,
}

impl Codec {
    pub const fn new(format: CodecFormat) -> Self {
        Self { format }
    }

    pub const fn json() -> Self {
        Self::new(CodecFormat::Json)
    }

    pub const fn message_pack() -> Self {
        Self::new(CodecFormat::MessagePack)
    }

    pub fn format(&self) -> CodecFormat {
        self.format
    }

    /// Encodes a value.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        match self.format {
            CodecFormat::Json => Ok(serde_json::to_vec(value)?),
            CodecFormat::MessagePack => Ok(rmp_serde::to_vec_named(value)?),
        }
    }

    /// Decodes bytes to `T`.
    ///
    /// Returns `Ok(None)` when the bytes hold an encoded null: the payload is
    /// well-formed but carries no usable value.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<Option<T>, CodecError> {
        if self.is_null(bytes) {
            return Ok(None);
        }
        match self.format {
            CodecFormat::Json => Ok(Some(serde_json::from_slice(bytes)?)),
            CodecFormat::MessagePack => Ok(Some(rmp_serde::from_slice(bytes)?)),
        }
    }

    fn is_null(&self, bytes: &[u8]) -> bool {
        match self.format {
            CodecFormat::Json => bytes.trim_ascii() == b"null",
            CodecFormat::MessagePack => bytes == [MSGPACK_NIL],
        }
    }
}

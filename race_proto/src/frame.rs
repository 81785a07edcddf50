//! Length-prefixed bincode framing: `[u32 LE length][payload]`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Upper bound on a single payload; anything larger is treated as a corrupt stream.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("frame of {len} bytes exceeds limit of {limit}")]
    Oversize { len: usize, limit: usize },
    #[error("truncated frame: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },
}

/// Serialize `message` and prepend its length.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>, FrameError> {
    let payload = bincode::serialize(message)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::Oversize {
            len: payload.len(),
            limit: MAX_FRAME_LEN,
        });
    }
    let mut buffer = Vec::with_capacity(4 + payload.len());
    buffer.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buffer.extend_from_slice(&payload);
    Ok(buffer)
}

/// Validate a length prefix read from a stream.
pub fn frame_len(prefix: [u8; 4]) -> Result<usize, FrameError> {
    let len = u32::from_le_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::Oversize {
            len,
            limit: MAX_FRAME_LEN,
        });
    }
    Ok(len)
}

pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, FrameError> {
    Ok(bincode::deserialize(payload)?)
}

/// Decode one complete frame (prefix included) from `bytes`.
pub fn decode_frame<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, FrameError> {
    if bytes.len() < 4 {
        return Err(FrameError::Truncated {
            expected: 4,
            found: bytes.len(),
        });
    }
    let len = frame_len([bytes[0], bytes[1], bytes[2], bytes[3]])?;
    let body = &bytes[4..];
    if body.len() < len {
        return Err(FrameError::Truncated {
            expected: len,
            found: body.len(),
        });
    }
    decode_payload(&body[..len])
}

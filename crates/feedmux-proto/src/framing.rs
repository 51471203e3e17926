//! Message framing utilities for transport layer.
//!
//! This module provides length-prefix framing for control and data payloads.
//! The format is simple: 4-byte big-endian length prefix followed by the
//! payload.

use crate::Error;

/// Maximum message size (4 MB) for security hardening.
/// Large payloads could be used for DoS attacks.
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Encode a payload with a length prefix.
///
/// Returns a new buffer containing `[length (4 bytes BE)][payload]`.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, Error> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(Error::InvalidMessage(format!(
            "payload size {} exceeds maximum {}",
            payload.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    let len = payload.len() as u32;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Decode the length from a 4-byte header.
///
/// Returns the payload length as a usize.
pub fn decode_frame_length(header: &[u8; LENGTH_PREFIX_SIZE]) -> Result<usize, Error> {
    let len = u32::from_be_bytes(*header) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(Error::InvalidMessage(format!(
            "frame length {} exceeds maximum {}",
            len, MAX_MESSAGE_SIZE
        )));
    }
    Ok(len)
}

/// Extract the payload from a complete frame.
pub fn extract_payload(frame: &[u8]) -> Result<&[u8], Error> {
    if frame.len() < LENGTH_PREFIX_SIZE {
        return Err(Error::InvalidMessage("frame too short".to_string()));
    }

    let mut header = [0u8; LENGTH_PREFIX_SIZE];
    header.copy_from_slice(&frame[..LENGTH_PREFIX_SIZE]);
    let len = decode_frame_length(&header)?;

    if frame.len() < LENGTH_PREFIX_SIZE + len {
        return Err(Error::InvalidMessage(format!(
            "frame incomplete: have {}, need {}",
            frame.len(),
            LENGTH_PREFIX_SIZE + len
        )));
    }

    Ok(&frame[LENGTH_PREFIX_SIZE..LENGTH_PREFIX_SIZE + len])
}

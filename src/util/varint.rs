//! Variable-length integer encoding utilities.
//!
//! 7 bits per byte with a continuation bit, as used by protocol buffers and
//! most index file formats. Both the structured file layer and the shuffle
//! wire codec build on these helpers.

use std::io::{Read, Write};

use byteorder::ReadBytesExt;

use crate::error::{Result, TsumugiError};

/// Encode a u64 value using variable-length encoding.
pub fn encode_u64(value: u64) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut val = value;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;

        if val != 0 {
            byte |= 0x80; // Set continuation bit
        }

        bytes.push(byte);

        if val == 0 {
            break;
        }
    }

    bytes
}

/// Decode a u64 value from variable-length encoding.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0;
    let mut bytes_read = 0;

    for &byte in bytes {
        bytes_read += 1;

        if shift >= 64 {
            return Err(TsumugiError::other("VarInt overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok((result, bytes_read));
        }

        shift += 7;
    }

    Err(TsumugiError::other("Incomplete VarInt"))
}

/// Write a variable-length encoded u64 to a writer.
pub fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<usize> {
    let bytes = encode_u64(value);
    writer.write_all(&bytes)?;
    Ok(bytes.len())
}

/// Read a variable-length encoded u64 from a reader.
pub fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0;

    loop {
        let byte = reader.read_u8()?;

        if shift >= 64 {
            return Err(TsumugiError::other("VarInt overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok(result);
        }

        shift += 7;
    }
}

//! Structured binary file I/O for segment data.
//!
//! Little-endian primitives, varints, and length-prefixed strings/bytes over
//! the storage stream traits, with a crc32 trailer appended on close so
//! readers can verify file integrity.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, TsumugiError};
use crate::storage::traits::{StorageInput, StorageOutput};
use crate::util::varint::{decode_u64, encode_u64};

/// A structured file writer for binary data.
pub struct StructWriter<W: StorageOutput> {
    writer: W,
    hasher: crc32fast::Hasher,
    position: u64,
}

impl<W: StorageOutput> StructWriter<W> {
    /// Create a new structured file writer.
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            hasher: crc32fast::Hasher::new(),
            position: 0,
        }
    }

    /// Write a u8 value.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.hasher.update(&[value]);
        self.position += 1;
        Ok(())
    }

    /// Write a u32 value (little-endian).
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.writer.write_u32::<LittleEndian>(value)?;
        self.hasher.update(&value.to_le_bytes());
        self.position += 4;
        Ok(())
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.hasher.update(&value.to_le_bytes());
        self.position += 8;
        Ok(())
    }

    /// Write a f64 value (little-endian).
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.writer.write_f64::<LittleEndian>(value)?;
        self.hasher.update(&value.to_le_bytes());
        self.position += 8;
        Ok(())
    }

    /// Write a variable-length integer.
    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        let encoded = encode_u64(value);
        self.writer.write_all(&encoded)?;
        self.hasher.update(&encoded);
        self.position += encoded.len() as u64;
        Ok(())
    }

    /// Write a string with length prefix.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        let bytes = value.as_bytes();
        self.write_varint(bytes.len() as u64)?;
        self.writer.write_all(bytes)?;
        self.hasher.update(bytes);
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Write raw bytes with length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_varint(value.len() as u64)?;
        self.writer.write_all(value)?;
        self.hasher.update(value);
        self.position += value.len() as u64;
        Ok(())
    }

    /// Write raw bytes without length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.writer.write_all(value)?;
        self.hasher.update(value);
        self.position += value.len() as u64;
        Ok(())
    }

    /// Write a sorted integer array using delta encoding.
    pub fn write_delta_compressed_u32s(&mut self, values: &[u32]) -> Result<()> {
        self.write_varint(values.len() as u64)?;

        let mut previous = 0u32;
        for &value in values {
            let delta = value.wrapping_sub(previous);
            self.write_varint(delta as u64)?;
            previous = value;
        }

        Ok(())
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Write the crc32 trailer, flush, and close the file.
    pub fn close(mut self) -> Result<()> {
        let checksum = self.hasher.finalize();
        self.writer.write_u32::<LittleEndian>(checksum)?;
        self.writer.flush()?;
        self.writer.close()?;
        Ok(())
    }
}

/// A structured file reader for binary data.
pub struct StructReader<R: StorageInput> {
    reader: R,
    hasher: crc32fast::Hasher,
    position: u64,
    file_size: u64,
}

impl<R: StorageInput> StructReader<R> {
    /// Create a new structured file reader.
    pub fn new(reader: R) -> Result<Self> {
        let file_size = reader.size()?;
        Ok(StructReader {
            reader,
            hasher: crc32fast::Hasher::new(),
            position: 0,
            file_size,
        })
    }

    /// Read a u8 value.
    pub fn read_u8(&mut self) -> Result<u8> {
        let value = self.reader.read_u8()?;
        self.hasher.update(&[value]);
        self.position += 1;
        Ok(value)
    }

    /// Read a u32 value (little-endian).
    pub fn read_u32(&mut self) -> Result<u32> {
        let value = self.reader.read_u32::<LittleEndian>()?;
        self.hasher.update(&value.to_le_bytes());
        self.position += 4;
        Ok(value)
    }

    /// Read a u64 value (little-endian).
    pub fn read_u64(&mut self) -> Result<u64> {
        let value = self.reader.read_u64::<LittleEndian>()?;
        self.hasher.update(&value.to_le_bytes());
        self.position += 8;
        Ok(value)
    }

    /// Read a f64 value (little-endian).
    pub fn read_f64(&mut self) -> Result<f64> {
        let value = self.reader.read_f64::<LittleEndian>()?;
        self.hasher.update(&value.to_le_bytes());
        self.position += 8;
        Ok(value)
    }

    /// Read a variable-length integer.
    pub fn read_varint(&mut self) -> Result<u64> {
        let mut bytes = Vec::new();
        loop {
            let byte = self.reader.read_u8()?;
            bytes.push(byte);
            if byte & 0x80 == 0 {
                break;
            }
        }

        let (value, _) = decode_u64(&bytes)?;
        self.hasher.update(&bytes);
        self.position += bytes.len() as u64;
        Ok(value)
    }

    /// Read a string with length prefix.
    pub fn read_string(&mut self) -> Result<String> {
        let length = self.read_varint()? as usize;
        let mut bytes = vec![0u8; length];
        self.reader.read_exact(&mut bytes)?;
        self.hasher.update(&bytes);
        self.position += length as u64;

        String::from_utf8(bytes).map_err(|e| TsumugiError::storage(format!("Invalid UTF-8: {e}")))
    }

    /// Read bytes with length prefix.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let length = self.read_varint()? as usize;
        let mut bytes = vec![0u8; length];
        self.reader.read_exact(&mut bytes)?;
        self.hasher.update(&bytes);
        self.position += length as u64;
        Ok(bytes)
    }

    /// Read exact number of raw bytes.
    pub fn read_raw(&mut self, length: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; length];
        self.reader.read_exact(&mut bytes)?;
        self.hasher.update(&bytes);
        self.position += length as u64;
        Ok(bytes)
    }

    /// Read a delta-compressed integer array.
    pub fn read_delta_compressed_u32s(&mut self) -> Result<Vec<u32>> {
        let length = self.read_varint()? as usize;
        let mut values = Vec::with_capacity(length);
        let mut previous = 0u32;

        for _ in 0..length {
            let delta = self.read_varint()? as u32;
            let value = previous.wrapping_add(delta);
            values.push(value);
            previous = value;
        }

        Ok(values)
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Get file size.
    pub fn size(&self) -> u64 {
        self.file_size
    }

    /// Check if all content before the crc32 trailer has been consumed.
    pub fn is_eof(&self) -> bool {
        self.position >= self.file_size.saturating_sub(4)
    }

    /// Verify file integrity against the stored crc32 trailer.
    ///
    /// Must be called after all content has been read.
    pub fn verify_checksum(&mut self) -> Result<bool> {
        if self.position + 4 > self.file_size {
            return Err(TsumugiError::storage("File too short for checksum"));
        }

        let computed = self.hasher.clone().finalize();
        let stored = self.reader.read_u32::<LittleEndian>()?;
        Ok(stored == computed)
    }

    /// Close the reader.
    pub fn close(mut self) -> Result<()> {
        self.reader.close()
    }
}

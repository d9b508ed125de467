//! In-memory named-byte-block store backing one segment file set.
//!
//! A [`RamDirectory`] is a miniature file system: a mapping from name to an
//! immutable byte buffer. Files are write-once, and enumeration follows
//! file-creation order, which is stable for a given directory instance. The
//! shuffle wire format relies on that stability: the write path emits files
//! in `list_files()` order and the read path recreates them positionally, so
//! a deserialized directory lists its files exactly like the original did.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::storage::traits::{StorageError, StorageInput, StorageOutput};

/// An in-memory, write-once directory of named byte blocks.
#[derive(Debug)]
pub struct RamDirectory {
    /// The file contents, keyed by name.
    files: Arc<Mutex<HashMap<String, Box<[u8]>>>>,
    /// File names in creation order. Drives `list_files()`.
    order: Arc<Mutex<Vec<String>>>,
}

impl RamDirectory {
    /// Create a new empty directory.
    pub fn new() -> Self {
        RamDirectory {
            files: Arc::new(Mutex::new(HashMap::new())),
            order: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a file for writing.
    ///
    /// Files are write-once: creating a name that already exists fails with
    /// `StorageError::FileExists`. The file becomes visible (and is added to
    /// the enumeration order) when the returned output is closed.
    pub fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let files = self.files.lock().unwrap();
        if files.contains_key(name) {
            return Err(StorageError::FileExists(name.to_string()).into());
        }

        Ok(Box::new(RamOutput::new(
            name.to_string(),
            Arc::clone(&self.files),
            Arc::clone(&self.order),
        )))
    }

    /// Open a file for reading. The input reads a private copy of the bytes.
    pub fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let files = self.files.lock().unwrap();
        let data = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;

        Ok(Box::new(RamInput::from_bytes(data.to_vec())))
    }

    /// Check if a file exists.
    pub fn file_exists(&self, name: &str) -> bool {
        self.files.lock().unwrap().contains_key(name)
    }

    /// List all file names in creation order.
    pub fn list_files(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }

    /// Get the size of a file in bytes.
    pub fn file_size(&self, name: &str) -> Result<u64> {
        let files = self.files.lock().unwrap();
        let data = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;

        Ok(data.len() as u64)
    }

    /// Get the number of files stored.
    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    /// Get the total size of all files in bytes.
    pub fn total_size(&self) -> u64 {
        let files = self.files.lock().unwrap();
        files.values().map(|data| data.len() as u64).sum()
    }

    /// Discard all files and start empty.
    ///
    /// The old buffers are dropped, not reused. Outputs created before the
    /// reset belong to the discarded contents and must not be closed into
    /// the fresh store.
    pub fn reset(&self) {
        *self.files.lock().unwrap() = HashMap::new();
        *self.order.lock().unwrap() = Vec::new();
    }
}

impl Default for RamDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// A memory-based input stream over an owned byte buffer.
#[derive(Debug)]
pub struct RamInput {
    cursor: Cursor<Vec<u8>>,
    size: u64,
}

impl RamInput {
    /// Create an input reading the given bytes.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        RamInput {
            cursor: Cursor::new(data),
            size,
        }
    }
}

impl Read for RamInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for RamInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl StorageInput for RamInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        Ok(Box::new(RamInput::from_bytes(self.cursor.get_ref().clone())))
    }

    fn close(&mut self) -> Result<()> {
        // Nothing to release for a memory input
        Ok(())
    }
}

/// A memory-based output stream. Bytes become visible in the owning
/// directory when the output is closed.
#[derive(Debug)]
struct RamOutput {
    name: String,
    buffer: Vec<u8>,
    files: Arc<Mutex<HashMap<String, Box<[u8]>>>>,
    order: Arc<Mutex<Vec<String>>>,
    position: u64,
    closed: bool,
}

impl RamOutput {
    fn new(
        name: String,
        files: Arc<Mutex<HashMap<String, Box<[u8]>>>>,
        order: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        RamOutput {
            name,
            buffer: Vec::new(),
            files,
            order,
            position: 0,
            closed: false,
        }
    }
}

impl Write for RamOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(std::io::Error::other("Output is closed"));
        }

        self.buffer.extend_from_slice(buf);
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for RamOutput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        if self.closed {
            return Err(std::io::Error::other("Output is closed"));
        }

        let new_pos = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::End(offset) => {
                let end = self.buffer.len() as i64 + offset;
                if end < 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "Invalid seek position",
                    ));
                }
                end as u64
            }
            SeekFrom::Current(offset) => {
                let cur = self.position as i64 + offset;
                if cur < 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "Invalid seek position",
                    ));
                }
                cur as u64
            }
        };

        self.position = new_pos;
        Ok(new_pos)
    }
}

impl StorageOutput for RamOutput {
    fn position(&self) -> Result<u64> {
        Ok(self.position)
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            let mut files = self.files.lock().unwrap();
            if files.contains_key(&self.name) {
                return Err(StorageError::FileExists(self.name.clone()).into());
            }
            files.insert(self.name.clone(), std::mem::take(&mut self.buffer).into_boxed_slice());
            self.order.lock().unwrap().push(self.name.clone());
            self.closed = true;
        }
        Ok(())
    }
}

impl Drop for RamOutput {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

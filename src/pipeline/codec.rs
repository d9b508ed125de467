//! Wire codec for shipping a directory through a byte stream.
//!
//! The layout is a signed 4-byte file count followed by one record per
//! file: a length-prefixed UTF-8 name, a signed 8-byte byte length, and
//! the raw file bytes. Files are written in `list_files()` order and
//! recreated positionally on read, so enumeration order survives the trip.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, TsumugiError};
use crate::storage::ram::RamDirectory;
use crate::util::varint;

/// Serialize every file of the directory into the writer.
pub fn write_directory<W: Write>(writer: &mut W, dir: &RamDirectory) -> Result<()> {
    let names = dir.list_files();
    let count = i32::try_from(names.len())
        .map_err(|_| TsumugiError::serialization("Too many files to serialize"))?;
    writer.write_i32::<LittleEndian>(count)?;

    for name in names {
        varint::write_u64(writer, name.len() as u64)?;
        writer.write_all(name.as_bytes())?;

        let size = dir.file_size(&name)?;
        let length = i64::try_from(size)
            .map_err(|_| TsumugiError::serialization(format!("File too large: {name}")))?;
        writer.write_i64::<LittleEndian>(length)?;

        let mut input = dir.open_input(&name)?;
        let copied = std::io::copy(&mut input, writer)?;
        input.close()?;
        if copied != size {
            return Err(TsumugiError::serialization(format!(
                "Short write for {name}: {copied} of {size} bytes"
            )));
        }
    }

    Ok(())
}

/// Deserialize files from the reader into the directory.
///
/// The directory should be empty; files are recreated in stream order so
/// the rebuilt directory enumerates exactly like the serialized one did.
pub fn read_directory<R: Read>(reader: &mut R, dir: &RamDirectory) -> Result<()> {
    let count = reader.read_i32::<LittleEndian>()?;
    if count < 0 {
        return Err(TsumugiError::serialization(format!(
            "Negative file count: {count}"
        )));
    }

    for _ in 0..count {
        let name_length = varint::read_u64(reader)? as usize;
        let mut name_bytes = vec![0u8; name_length];
        reader.read_exact(&mut name_bytes)?;
        let name = String::from_utf8(name_bytes)
            .map_err(|e| TsumugiError::serialization(format!("Invalid file name: {e}")))?;

        let length = reader.read_i64::<LittleEndian>()?;
        if length < 0 {
            return Err(TsumugiError::serialization(format!(
                "Negative length for {name}: {length}"
            )));
        }

        let mut output = dir.create_output(&name)?;
        let copied = std::io::copy(&mut reader.by_ref().take(length as u64), &mut output)?;
        if copied != length as u64 {
            return Err(TsumugiError::serialization(format!(
                "Truncated stream for {name}: {copied} of {length} bytes"
            )));
        }
        output.close()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populate(dir: &RamDirectory, files: &[(&str, &[u8])]) {
        for (name, bytes) in files {
            let mut output = dir.create_output(name).unwrap();
            output.write_all(bytes).unwrap();
            output.close().unwrap();
        }
    }

    #[test]
    fn test_round_trip() {
        let source = RamDirectory::new();
        populate(
            &source,
            &[
                ("z.cmp", b"last first".as_slice()),
                ("a.cmp", b"".as_slice()),
                ("m.cmp", b"\x00\x01\x02".as_slice()),
            ],
        );

        let mut buffer = Vec::new();
        write_directory(&mut buffer, &source).unwrap();

        let target = RamDirectory::new();
        read_directory(&mut buffer.as_slice(), &target).unwrap();

        // Stream order preserves the source enumeration order
        assert_eq!(target.list_files(), source.list_files());
        for name in source.list_files() {
            let mut expected = Vec::new();
            source.open_input(&name).unwrap().read_to_end(&mut expected).unwrap();
            let mut actual = Vec::new();
            target.open_input(&name).unwrap().read_to_end(&mut actual).unwrap();
            assert_eq!(actual, expected, "content mismatch for {name}");
        }
    }

    #[test]
    fn test_empty_directory_round_trip() {
        let source = RamDirectory::new();

        let mut buffer = Vec::new();
        write_directory(&mut buffer, &source).unwrap();
        assert_eq!(buffer, 0i32.to_le_bytes());

        let target = RamDirectory::new();
        read_directory(&mut buffer.as_slice(), &target).unwrap();
        assert_eq!(target.file_count(), 0);
    }

    #[test]
    fn test_negative_count_rejected() {
        let buffer = (-1i32).to_le_bytes();
        let target = RamDirectory::new();
        assert!(read_directory(&mut buffer.as_slice(), &target).is_err());
    }

    #[test]
    fn test_truncated_stream_rejected() {
        let source = RamDirectory::new();
        populate(&source, &[("f.cmp", b"0123456789".as_slice())]);

        let mut buffer = Vec::new();
        write_directory(&mut buffer, &source).unwrap();
        buffer.truncate(buffer.len() - 3);

        let target = RamDirectory::new();
        assert!(read_directory(&mut buffer.as_slice(), &target).is_err());
    }

    #[test]
    fn test_serialized_form_is_deterministic() {
        let build = || {
            let dir = RamDirectory::new();
            populate(&dir, &[("b.cmp", b"bb".as_slice()), ("a.cmp", b"aa".as_slice())]);
            let mut buffer = Vec::new();
            write_directory(&mut buffer, &dir).unwrap();
            buffer
        };

        assert_eq!(build(), build());
    }
}

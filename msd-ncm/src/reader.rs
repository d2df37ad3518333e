use crate::{Error, Result};
use std::io::{self, Read};

/// Read a little-endian u32 length field.
pub(crate) fn read_u32_le<R: Read>(reader: &mut R, what: &str) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|_| Error::TruncatedFile(format!("{what} length field")))?;
    Ok(u32::from_le_bytes(buf))
}

/// Read exactly `len` bytes without preallocating a hostile length.
pub(crate) fn read_exact_vec<R: Read>(reader: &mut R, len: usize, what: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.take(len as u64).read_to_end(&mut buf)?;

    if buf.len() != len {
        return Err(Error::TruncatedFile(format!(
            "{what} declares {len} bytes but only {} are present",
            buf.len()
        )));
    }

    Ok(buf)
}

/// Read one length-prefixed block: a little-endian u32 followed by that
/// many bytes. A declared length of zero yields an empty block.
pub(crate) fn read_block<R: Read>(reader: &mut R, what: &str) -> Result<Vec<u8>> {
    let len = read_u32_le(reader, what)? as usize;
    read_exact_vec(reader, len, what)
}

/// Skip `len` bytes of padding.
pub(crate) fn skip<R: Read>(reader: &mut R, len: u64, what: &str) -> Result<()> {
    let copied = io::copy(&mut reader.take(len), &mut io::sink())?;

    if copied != len {
        return Err(Error::TruncatedFile(format!(
            "{what} ends {} bytes early",
            len - copied
        )));
    }

    Ok(())
}

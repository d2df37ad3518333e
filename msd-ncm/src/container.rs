use crate::{Error, Result, reader};
use std::io::Read;

/// NCM file magic: "CTENFDAM".
pub(crate) const MAGIC: [u8; 8] = *b"CTENFDAM";

/// Fixed padding between the metadata block and the image frame.
const POST_META_PAD: u64 = 5;

/// The two fixed AES-128 keys used by the container's ECB layers.
///
/// Defaults to the constants the format ships with; tests and callers that
/// deal with re-wrapped containers can substitute their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NcmKeys {
    /// Key for the audio-key block.
    pub core: [u8; 16],
    /// Key for the metadata block.
    pub meta: [u8; 16],
}

impl Default for NcmKeys {
    fn default() -> Self {
        Self {
            core: *b"hzHRAmso5kInbaxW",
            meta: *b"#14ljk_!\\]&0U<'(",
        }
    }
}

/// Raw blocks of one NCM container, read strictly in file order.
///
/// `parse` consumes the reader up to the first audio byte and never
/// buffers the audio payload itself, so arbitrarily large files stay
/// cheap to open.
#[derive(Debug, Clone)]
pub struct NcmContainer {
    /// Format version from the two bytes after the magic. Informational.
    pub version: u16,
    /// Audio-key block, still XOR/AES wrapped.
    pub key_block: Vec<u8>,
    /// Metadata block, still wrapped; empty when the container carries none.
    pub meta_block: Vec<u8>,
    /// Reserved capacity of the image frame. The frame may be larger than
    /// the image it holds; the difference is skipped before the audio.
    pub image_reserved: u32,
    /// Embedded artwork bytes, stored in the clear.
    pub image: Vec<u8>,
}

impl NcmContainer {
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;

        if magic != MAGIC {
            return Err(Error::InvalidFormat(format!(
                "unknown magic header {magic:02x?}"
            )));
        }

        let mut version = [0u8; 2];
        reader.read_exact(&mut version)?;
        let version = u16::from_le_bytes(version);

        let key_block = reader::read_block(reader, "key block")?;
        let meta_block = reader::read_block(reader, "metadata block")?;

        reader::skip(reader, POST_META_PAD, "post-metadata padding")?;

        // The image frame carries two lengths: the reserved capacity of the
        // frame and the size of the image actually written into it. The
        // leftover reserved space sits between the image and the audio.
        let image_reserved = reader::read_u32_le(reader, "image frame")?;
        let image_len = reader::read_u32_le(reader, "image")?;
        let image = reader::read_exact_vec(reader, image_len as usize, "image")?;

        let gap = u64::from(image_reserved.saturating_sub(image_len));
        if gap > 0 {
            reader::skip(reader, gap, "image frame padding")?;
        }

        Ok(Self {
            version,
            key_block,
            meta_block,
            image_reserved,
            image,
        })
    }
}

//! Parser and decryptor for the NCM encrypted music container.
//!
//! An NCM file wraps a compressed audio stream behind a per-file key: the
//! key block is AES/ECB wrapped, the audio is XORed with a keystream
//! derived from it, and metadata plus cover art ride along in their own
//! blocks. [`NcmFile`] runs the whole pipeline; the lower-level pieces
//! ([`NcmContainer`], [`recover_key`], [`extract_metadata`], [`Rc4`]) are
//! exported for callers that only need part of it.

mod container;
mod error;
mod key;
mod metadata;
mod rc4;
mod reader;
mod sniff;

pub use container::{NcmContainer, NcmKeys};
pub use error::Error;
pub use key::recover_key;
pub use metadata::{TrackMetadata, extract_metadata};
pub use rc4::Rc4;
pub use sniff::{AudioKind, ImageKind};

use log::warn;
use std::io::{Read, Write};

/// A `Result` alias where the `Err` case is `msd_ncm::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Audio payloads are decrypted in chunks of this size so large files
/// never have to fit in memory.
const CHUNK_SIZE: usize = 0x8000;

/// Embedded cover art with its sniffed format.
#[derive(Debug, Clone)]
pub struct Artwork {
    pub kind: ImageKind,
    pub data: Vec<u8>,
}

/// One parsed container, ready for audio decryption.
///
/// Parsing recovers the audio key and decodes the side blocks but leaves
/// the payload untouched; [`NcmFile::decode_audio`] streams it through
/// the keystream afterwards. The recovered key lives only inside this
/// value and is dropped with it.
#[derive(Debug)]
pub struct NcmFile {
    /// Container format version. Informational.
    pub version: u16,
    /// Parsed metadata; empty when the block is absent or undecodable.
    pub metadata: TrackMetadata,
    /// Embedded cover art, if any.
    pub artwork: Option<Artwork>,
    audio_key: Vec<u8>,
}

impl NcmFile {
    /// Parse a container with the format's stock keys.
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        Self::parse_with_keys(reader, &NcmKeys::default())
    }

    /// Parse a container, consuming `reader` up to the first audio byte.
    ///
    /// A bad magic header or a truncated block aborts with no partial
    /// result, and an unrecoverable key is fatal. Metadata problems are
    /// only logged: the record degrades to empty rather than blocking
    /// audio recovery, and artwork in an unknown format is kept as-is.
    pub fn parse_with_keys<R: Read>(reader: &mut R, keys: &NcmKeys) -> Result<Self> {
        let container = NcmContainer::parse(reader)?;
        let audio_key = key::recover_key(keys, &container.key_block)?;

        let metadata = match metadata::extract_metadata(keys, &container.meta_block) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("{e}; continuing without metadata");
                TrackMetadata::default()
            }
        };

        let artwork = if container.image.is_empty() {
            None
        } else {
            let kind = ImageKind::sniff(&container.image);
            if kind == ImageKind::Unknown {
                warn!("embedded artwork has an unrecognized format, keeping the raw bytes");
            }
            Some(Artwork {
                kind,
                data: container.image,
            })
        };

        Ok(Self {
            version: container.version,
            metadata,
            artwork,
            audio_key,
        })
    }

    /// Decrypt the audio payload from `reader` into `writer`.
    ///
    /// Runs in fixed-size chunks with the cipher state carried across
    /// chunk boundaries, and sniffs the leading bytes for the stream's
    /// real container kind. Nothing is framed, trimmed or appended: the
    /// output is the byte-exact compressed stream.
    pub fn decode_audio<R: Read, W: Write>(&self, reader: &mut R, writer: &mut W) -> Result<AudioKind> {
        let mut cipher = Rc4::new(&self.audio_key);
        let mut buffer = [0u8; CHUNK_SIZE];
        let mut kind = AudioKind::Unknown;
        let mut at_start = true;

        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }

            cipher.apply(&mut buffer[..n]);

            if at_start {
                kind = AudioKind::sniff(&buffer[..n]);
                at_start = false;
            }

            writer.write_all(&buffer[..n])?;
        }

        Ok(kind)
    }
}

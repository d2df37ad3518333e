//! Magic-byte sniffing for the recovered audio stream and artwork.
//!
//! The extension the metadata declares is not authoritative, so both the
//! decrypted payload and the embedded image are identified by their
//! leading bytes.

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
const PNG_MAGIC: [u8; 4] = [0x89, 0x50, 0x4E, 0x47];

/// Compressed-audio containers recognized in a decrypted payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioKind {
    Mp3,
    Wav,
    Flac,
    M4a,
    Unknown,
}

impl AudioKind {
    pub fn sniff(data: &[u8]) -> Self {
        if data.starts_with(b"ID3") {
            return Self::Mp3;
        }

        // Raw MPEG audio without an ID3 tag starts at a frame sync:
        // eleven set bits.
        if data.len() >= 2 && data[0] == 0xFF && data[1] & 0xE0 == 0xE0 {
            return Self::Mp3;
        }

        if data.starts_with(b"RIFF") && data.len() >= 12 && &data[8..12] == b"WAVE" {
            return Self::Wav;
        }

        if data.starts_with(b"fLaC") {
            return Self::Flac;
        }

        // The ftyp box sits after a 4-byte box size.
        if data.len() >= 8 && &data[4..8] == b"ftyp" {
            return Self::M4a;
        }

        Self::Unknown
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::M4a => "m4a",
            Self::Unknown => "bin",
        }
    }

    /// ffmpeg demuxer name to pass as an input-format hint.
    pub fn demuxer(self) -> Option<&'static str> {
        match self {
            Self::Mp3 => Some("mp3"),
            Self::Wav => Some("wav"),
            Self::Flac => Some("flac"),
            // The mp4 demuxer only registers under its combined
            // "mov,mp4,m4a,..." name; probing handles these fine.
            Self::M4a | Self::Unknown => None,
        }
    }
}

/// Artwork formats recognized in the image block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Unknown,
}

impl ImageKind {
    pub fn sniff(data: &[u8]) -> Self {
        if data.starts_with(&JPEG_MAGIC) {
            Self::Jpeg
        } else if data.starts_with(&PNG_MAGIC) {
            Self::Png
        } else {
            Self::Unknown
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Unknown => "bin",
        }
    }
}

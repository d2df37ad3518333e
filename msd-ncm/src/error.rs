use std::{fmt, io};

/// The errors that may occur while parsing and decrypting an NCM container.
#[derive(Debug)]
pub enum Error {
    /// The 8-byte magic header does not match the format constant.
    InvalidFormat(String),
    /// A declared block length runs past the end of the input.
    TruncatedFile(String),
    /// No usable audio key could be recovered from the key block.
    /// There is no way to decrypt the payload without it.
    KeyRecoveryFailed(String),
    /// The metadata block could not be decoded. Callers degrade to an
    /// empty record instead of aborting audio recovery.
    MetadataParse(String),
    /// Underlying reader or writer failure.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat(reason) => write!(f, "invalid ncm container: {reason}"),
            Self::TruncatedFile(reason) => write!(f, "truncated ncm container: {reason}"),
            Self::KeyRecoveryFailed(reason) => write!(f, "key recovery failed: {reason}"),
            Self::MetadataParse(reason) => write!(f, "metadata decode failed: {reason}"),
            Self::Io(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        // read_exact reports a short read as UnexpectedEof, which for this
        // format always means a declared length outran the file.
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Self::TruncatedFile("unexpected end of file".to_owned())
        } else {
            Self::Io(e)
        }
    }
}

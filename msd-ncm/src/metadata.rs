use crate::{Error, NcmKeys, Result, key};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

/// Single-byte mask applied over the whole metadata block on disk.
const META_XOR: u8 = 0x63;

/// Fixed ASCII header in front of the base64 transport layer.
const META_HEADER: &[u8; 22] = b"163 key(Don't modify):";

/// Prefix in front of the decrypted JSON document.
const META_PLAIN_PREFIX: &[u8; 6] = b"music:";

/// Structured metadata embedded in the container.
///
/// Field names follow this crate; the embedded JSON uses the client's
/// camelCase names, mapped on deserialization only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    #[serde(rename(deserialize = "musicName"), default)]
    pub title: String,
    #[serde(default, deserialize_with = "artist_names")]
    pub artist: Vec<String>,
    #[serde(default)]
    pub album: String,
    #[serde(rename(deserialize = "duration"), default)]
    pub duration_ms: u64,
    /// Audio format the client claims to have wrapped. Not authoritative;
    /// the decrypted stream is sniffed instead.
    #[serde(default)]
    pub format: String,
}

impl TrackMetadata {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// The artist list appears either as plain names or as `[name, id]`
/// pairs, depending on the client version that wrote the file.
fn artist_names<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let mut names = Vec::new();

    if let serde_json::Value::Array(entries) = value {
        for entry in entries {
            match entry {
                serde_json::Value::String(name) => names.push(name),
                serde_json::Value::Array(pair) => {
                    if let Some(serde_json::Value::String(name)) = pair.into_iter().next() {
                        names.push(name);
                    }
                }
                _ => (),
            }
        }
    }

    Ok(names)
}

/// Decrypt and parse the metadata block.
///
/// The block is wrapped three times over: a single-byte XOR, a fixed
/// ASCII header plus base64, then AES-128/ECB. An empty block is valid
/// and yields an empty record; any decode failure is `MetadataParse`,
/// which callers absorb so that metadata never blocks audio recovery.
pub fn extract_metadata(keys: &NcmKeys, meta_block: &[u8]) -> Result<TrackMetadata> {
    if meta_block.is_empty() {
        return Ok(TrackMetadata::default());
    }

    let unwrapped = meta_block.iter().map(|b| b ^ META_XOR).collect::<Vec<u8>>();

    let encoded = unwrapped
        .strip_prefix(META_HEADER)
        .ok_or_else(|| Error::MetadataParse("missing 163 key header".to_owned()))?;

    let wrapped = BASE64
        .decode(encoded)
        .map_err(|e| Error::MetadataParse(format!("base64 layer: {e}")))?;

    let plain = key::aes_ecb_decrypt(&keys.meta, &wrapped)
        .ok_or_else(|| Error::MetadataParse("AES layer rejected the metadata block".to_owned()))?;

    let document = plain.strip_prefix(META_PLAIN_PREFIX).unwrap_or(&plain);

    serde_json::from_slice(document).map_err(|e| Error::MetadataParse(e.to_string()))
}

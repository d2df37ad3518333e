use crate::{Error, NcmKeys, Result};
use aes::Aes128;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, KeyInit};

type Aes128EcbDec = ecb::Decryptor<Aes128>;

/// Single-byte mask applied over the whole key block on disk.
const KEY_XOR: u8 = 0x64;

/// Literal prefix expected at the start of the decrypted key blob.
const KEY_PREFIX: &[u8; 17] = b"neteasecloudmusic";

pub(crate) fn aes_ecb_decrypt(key: &[u8; 16], data: &[u8]) -> Option<Vec<u8>> {
    Aes128EcbDec::new(key.into())
        .decrypt_padded_vec_mut::<Pkcs7>(data)
        .ok()
}

/// Recover the audio keystream key from the container's key block.
///
/// Two layout variants exist in the wild: the key material either sits in
/// a JSON object with a `key` byte array, or follows the literal prefix
/// directly. Neither is assumed obsolete; the JSON form is tried first
/// and prefix slicing is the fallback. Only both failing is fatal.
pub fn recover_key(keys: &NcmKeys, key_block: &[u8]) -> Result<Vec<u8>> {
    if key_block.is_empty() {
        return Err(Error::KeyRecoveryFailed("empty key block".to_owned()));
    }

    let unwrapped = key_block.iter().map(|b| b ^ KEY_XOR).collect::<Vec<u8>>();
    let plain = aes_ecb_decrypt(&keys.core, &unwrapped).ok_or_else(|| {
        Error::KeyRecoveryFailed("AES layer rejected the key block".to_owned())
    })?;

    if let Some(key) = json_embedded_key(&plain) {
        return Ok(key);
    }

    if let Some(key) = plain.strip_prefix(KEY_PREFIX)
        && !key.is_empty()
    {
        return Ok(key.to_vec());
    }

    Err(Error::KeyRecoveryFailed(
        "no usable key material after both strategies".to_owned(),
    ))
}

fn json_embedded_key(plain: &[u8]) -> Option<Vec<u8>> {
    let start = plain.iter().position(|&b| b == b'{')?;
    let value = serde_json::from_slice::<serde_json::Value>(&plain[start..]).ok()?;

    let key = value
        .get("key")?
        .as_array()?
        .iter()
        .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect::<Option<Vec<u8>>>()?;

    (!key.is_empty()).then_some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockEncryptMut;

    type Aes128EcbEnc = ecb::Encryptor<Aes128>;

    fn wrap_key_block(keys: &NcmKeys, plain: &[u8]) -> Vec<u8> {
        let mut block = Aes128EcbEnc::new((&keys.core).into()).encrypt_padded_vec_mut::<Pkcs7>(plain);
        for b in &mut block {
            *b ^= KEY_XOR;
        }
        block
    }

    #[test]
    fn recovers_raw_suffix_variant() {
        let keys = NcmKeys::default();
        let mut plain = KEY_PREFIX.to_vec();
        plain.extend_from_slice(b"0123456789abcdef");

        let key = recover_key(&keys, &wrap_key_block(&keys, &plain)).unwrap();
        assert_eq!(key, b"0123456789abcdef");
    }

    #[test]
    fn recovers_json_embedded_variant() {
        let keys = NcmKeys::default();
        let mut plain = KEY_PREFIX.to_vec();
        plain.extend_from_slice(br#"{"key":[1,2,3,255]}"#);

        let key = recover_key(&keys, &wrap_key_block(&keys, &plain)).unwrap();
        assert_eq!(key, [1, 2, 3, 255]);
    }

    #[test]
    fn missing_key_material_is_fatal() {
        let keys = NcmKeys::default();
        let plain = KEY_PREFIX.to_vec(); // prefix only, nothing after

        let err = recover_key(&keys, &wrap_key_block(&keys, &plain)).unwrap_err();
        assert!(matches!(err, Error::KeyRecoveryFailed(_)));
    }

    #[test]
    fn garbage_block_is_fatal() {
        let keys = NcmKeys::default();
        let err = recover_key(&keys, &[0x41; 7]).unwrap_err();
        assert!(matches!(err, Error::KeyRecoveryFailed(_)));
    }

    #[test]
    fn empty_block_is_fatal() {
        let keys = NcmKeys::default();
        let err = recover_key(&keys, &[]).unwrap_err();
        assert!(matches!(err, Error::KeyRecoveryFailed(_)));
    }
}

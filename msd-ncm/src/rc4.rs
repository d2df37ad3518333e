/// Keystream cipher for the NCM audio payload.
///
/// Key scheduling is plain RC4. Generation is the format's own variant:
/// the permutation table stays fixed after scheduling and the keystream
/// byte depends only on the absolute payload offset. The cipher tracks
/// that offset across `apply` calls, so chunked decryption never resets
/// state.
pub struct Rc4 {
    sbox: [u8; 256],
    offset: usize,
}

impl Rc4 {
    pub fn new(key: &[u8]) -> Self {
        debug_assert!(!key.is_empty(), "keystream key must not be empty");

        let mut sbox: [u8; 256] = std::array::from_fn(|i| i as u8);
        let mut j = 0u8;

        for i in 0..256 {
            j = j.wrapping_add(sbox[i]).wrapping_add(key[i % key.len()]);
            sbox.swap(i, j as usize);
        }

        Self { sbox, offset: 0 }
    }

    /// XOR the keystream over `buf` in place, advancing the stream offset.
    pub fn apply(&mut self, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte ^= self.keystream_byte(self.offset + i);
        }
        self.offset += buf.len();
    }

    fn keystream_byte(&self, offset: usize) -> u8 {
        let j = (offset + 1) & 0xff;
        let a = self.sbox[j] as usize;
        let b = self.sbox[(a + j) & 0xff] as usize;
        self.sbox[(a + b) & 0xff]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] =
        b"118198033285E7fT49x7dof9OKCgg9cdvhEuezy3iZCL1nFvBFd1T4uSktAJKmwZXsijPbijliionVUXXg9plTbXEclAE9Lb";

    /// Permutation table expected after scheduling `KEY`.
    const SCHEDULED: [u8; 256] = [
        0x43, 0x63, 0x9D, 0xE2, 0x5B, 0x4B, 0x55, 0xBB, 0x4C, 0xCF, 0x2A, 0x62, 0x0E, 0x48,
        0x8A, 0x15, 0x59, 0x52, 0xBA, 0x6C, 0xEF, 0x6D, 0x72, 0x39, 0xA0, 0x9A, 0xA9, 0x27,
        0x66, 0xBC, 0xF9, 0xC0, 0x47, 0xDF, 0x7D, 0xDE, 0x3B, 0x81, 0x04, 0xFF, 0x90, 0x77,
        0x80, 0x50, 0x54, 0xBD, 0x0D, 0x58, 0x34, 0x0A, 0x44, 0xA8, 0x5F, 0x99, 0xC6, 0xBE,
        0x4E, 0x4D, 0x13, 0x17, 0x83, 0x01, 0x35, 0x5C, 0xF4, 0x7B, 0x53, 0x31, 0x86, 0xD4,
        0xB8, 0xAB, 0xD1, 0xB5, 0x68, 0xDC, 0x96, 0xF1, 0x9C, 0xE8, 0x7A, 0x1B, 0xB0, 0x56,
        0x22, 0x1A, 0x51, 0x92, 0xBF, 0xFA, 0xB1, 0x19, 0x88, 0x26, 0x49, 0x08, 0xEB, 0xAC,
        0x14, 0x28, 0xAD, 0x3A, 0x8C, 0x85, 0x84, 0x2C, 0x82, 0xB3, 0xA6, 0xA2, 0xA3, 0x12,
        0x78, 0xA1, 0x57, 0xAE, 0x00, 0x2F, 0xB6, 0x61, 0xA5, 0x6F, 0x5A, 0x89, 0x29, 0x46,
        0x2E, 0x4F, 0x36, 0x40, 0x07, 0x87, 0xA7, 0x65, 0x73, 0xC4, 0x7C, 0x33, 0x1E, 0xE5,
        0x10, 0xB4, 0xFD, 0xC9, 0xE0, 0xB7, 0x97, 0x32, 0x5D, 0x64, 0x41, 0xF0, 0x20, 0xC3,
        0x95, 0xFE, 0xD2, 0x21, 0xFB, 0x75, 0x3D, 0x0B, 0x3E, 0xF2, 0xD5, 0xCB, 0xD6, 0xF7,
        0x1F, 0x24, 0x45, 0x69, 0xB9, 0xDA, 0x6A, 0x76, 0x03, 0xF8, 0x70, 0x8E, 0xC1, 0xC8,
        0xD7, 0x4A, 0xD0, 0x9E, 0xCD, 0xA4, 0xCE, 0xAA, 0x1D, 0xED, 0xF6, 0x02, 0x60, 0xE3,
        0xDB, 0x8D, 0x09, 0xF3, 0x37, 0xE1, 0xC5, 0xCA, 0x8F, 0x2D, 0x7F, 0x74, 0x42, 0x6E,
        0x8B, 0x3F, 0x23, 0xC2, 0xD3, 0xCC, 0xD9, 0xEE, 0x98, 0xE6, 0x11, 0x05, 0xEA, 0xD8,
        0xB2, 0xE4, 0xF5, 0xE7, 0x71, 0x2B, 0x93, 0x9B, 0x3C, 0x30, 0xE9, 0xC7, 0x38, 0xEC,
        0x18, 0x6B, 0x79, 0xFC, 0xAF, 0x5E, 0x9F, 0x7E, 0x91, 0xDD, 0x16, 0x94, 0x0F, 0x06,
        0x67, 0x25, 0x0C, 0x1C,
    ];

    #[test]
    fn scheduling_matches_known_table() {
        assert_eq!(Rc4::new(KEY).sbox, SCHEDULED);
    }

    #[test]
    fn zero_ciphertext_yields_expected_keystream() {
        let mut buf = [0u8; 16];
        Rc4::new(KEY).apply(&mut buf);

        // Expected bytes computed from the known table with the format's
        // generation rule, independent of the implementation under test.
        let expected: Vec<u8> = (0..16)
            .map(|k| {
                let j = (k + 1) & 0xff;
                let a = SCHEDULED[j] as usize;
                let b = SCHEDULED[(a + j) & 0xff] as usize;
                SCHEDULED[(a + b) & 0xff]
            })
            .collect();

        assert_eq!(buf.as_slice(), expected);
    }

    #[test]
    fn chunked_apply_equals_one_shot() {
        let data: Vec<u8> = (0..=255).cycle().take(1000).collect();

        let mut one_shot = data.clone();
        Rc4::new(KEY).apply(&mut one_shot);

        let mut chunked = data;
        let mut cipher = Rc4::new(KEY);
        for chunk in chunked.chunks_mut(7) {
            cipher.apply(chunk);
        }

        assert_eq!(chunked, one_shot);
    }

    #[test]
    fn keystream_repeats_every_256_bytes() {
        let mut buf = [0u8; 512];
        Rc4::new(KEY).apply(&mut buf);
        assert_eq!(buf[..256], buf[256..]);
    }

    #[test]
    fn apply_round_trips() {
        let plain = b"the same keystream encrypts and decrypts".to_vec();

        let mut data = plain.clone();
        Rc4::new(b"fixture key").apply(&mut data);
        assert_ne!(data, plain);

        Rc4::new(b"fixture key").apply(&mut data);
        assert_eq!(data, plain);
    }
}

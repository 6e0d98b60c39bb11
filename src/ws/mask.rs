//! Payload masking
//!
//! The 4-byte key is applied cyclically by payload position. The key is
//! always handled as wire-order bytes, never as a host-order integer.

/// XOR `payload` in place with `key[i % 4]`
///
/// Masking is its own inverse, so the same call masks and unmasks.
#[inline]
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    let mut chunks = payload.chunks_exact_mut(4);
    for chunk in &mut chunks {
        chunk[0] ^= key[0];
        chunk[1] ^= key[1];
        chunk[2] ^= key[2];
        chunk[3] ^= key[3];
    }
    for (byte, k) in chunks.into_remainder().iter_mut().zip(key) {
        *byte ^= k;
    }
}

/// Fresh masking key in network byte order
#[inline]
pub fn random_mask_key() -> [u8; 4] {
    rand::random::<u32>().to_be_bytes()
}

//! Payload masking (XOR with a repeating 4-byte key).
//!
//! Masking is its own inverse: applying the same key twice restores the
//! original bytes.

/// XOR byte `i` of `data` with `mask[i % 4]`.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Word-at-a-time variant of [`apply_mask`] for large payloads.
#[inline]
pub fn apply_mask_fast(data: &mut [u8], mask: [u8; 4]) {
    let key = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ key;
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    // Chunks are whole words, so the tail starts at a multiple of 4.
    apply_mask(chunks.into_remainder(), mask);
}

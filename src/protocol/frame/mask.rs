/// Masks or unmasks `buf` in place. `offset` is the index of `buf[0]` within the whole payload,
/// so a payload can be processed chunk by chunk with the key staying aligned.
#[inline]
pub fn apply_mask(buf: &mut [u8], mask: [u8; 4], offset: usize) {
    let shift = offset % 4;
    let mut rotated = [0u8; 4];
    for (i, byte) in rotated.iter_mut().enumerate() {
        *byte = mask[(i + shift) % 4];
    }
    apply_mask_fast32(buf, rotated);
}

/// One byte at a time.
#[inline]
fn apply_mask_fallback(buf: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= mask[i & 3];
    }
}

/// Four bytes at a time from the start of the buffer, the tail byte by byte.
#[inline]
fn apply_mask_fast32(buf: &mut [u8], mask: [u8; 4]) {
    let mut chunks = buf.chunks_exact_mut(4);
    let mask_u32 = u32::from_ne_bytes(mask);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ mask_u32;
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    apply_mask_fallback(chunks.into_remainder(), mask);
}

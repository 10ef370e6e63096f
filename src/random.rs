//! Source of the handshake nonce and of the frame masking keys.

use rand::{RngCore, rngs::ThreadRng};

/// A supplier of random bytes.
///
/// Masking keys only have to be unpredictable to intermediaries, so a cryptographically secure
/// generator is not required. Consecutive calls must not keep returning the same bytes.
pub trait RandomSource {
    /// Returns the next random byte.
    fn next_byte(&mut self) -> u8;

    /// Fills `dst` with random bytes.
    fn fill(&mut self, dst: &mut [u8]) {
        for byte in dst {
            *byte = self.next_byte();
        }
    }
}

impl RandomSource for ThreadRng {
    fn next_byte(&mut self) -> u8 {
        self.next_u32() as u8
    }

    fn fill(&mut self, dst: &mut [u8]) {
        self.fill_bytes(dst);
    }
}

impl<R: RandomSource + ?Sized> RandomSource for &mut R {
    fn next_byte(&mut self) -> u8 {
        (**self).next_byte()
    }

    fn fill(&mut self, dst: &mut [u8]) {
        (**self).fill(dst);
    }
}

/// The generator used when none is supplied.
pub fn default_source() -> ThreadRng {
    rand::rng()
}

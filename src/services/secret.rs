//! Secret key material for new tenant users.

use rand::{RngCore, rngs::OsRng};

/// Random bytes drawn per secret; hex encoding doubles the length.
pub const SECRET_BYTES: usize = 16;

/// Draw a fresh secret from the operating system RNG, hex encoded.
///
/// Never falls back to a non-cryptographic source; an unavailable OS RNG is
/// an error.
pub fn generate_secret() -> Result<String, rand::Error> {
    generate_secret_from(&mut OsRng)
}

pub(crate) fn generate_secret_from<R: RngCore + ?Sized>(rng: &mut R) -> Result<String, rand::Error> {
    let mut bytes = [0u8; SECRET_BYTES];
    rng.try_fill_bytes(&mut bytes)?;
    Ok(hex::encode(bytes))
}

//! HKDF-SHA256 helpers built on `ring`.

use ring::hkdf;
use zeroize::Zeroizing;

use super::CryptoError;

/// Output length marker for `ring`'s HKDF expand step.
struct OkmLen(usize);

impl hkdf::KeyType for OkmLen {
    fn len(&self) -> usize {
        self.0
    }
}

/// Derive `N` bytes of key material with HKDF-SHA256.
pub fn hkdf_sha256<const N: usize>(
    salt: &[u8],
    ikm: &[u8],
    info: &[u8],
) -> Result<Zeroizing<[u8; N]>, CryptoError> {
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, salt).extract(ikm);
    let info = [info];
    let okm = prk.expand(&info, OkmLen(N)).map_err(|_| {
        CryptoError::KeyDerivationFailed("requested output too long for HKDF-SHA256")
    })?;

    let mut out = Zeroizing::new([0u8; N]);
    okm.fill(&mut out[..])
        .map_err(|_| CryptoError::KeyDerivationFailed("HKDF fill failed"))?;
    Ok(out)
}

use super::{
    branch_opt_util,
    error::PSIError,
    params::{KEY_GENERATION_MAX_ATTEMPT_COUNT, SECRET_KEY_BYTE_LEN},
};
use curve25519_dalek::scalar::Scalar;
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;
use std::fmt::{Debug, Formatter};
use zeroize::Zeroize;

/// Secret blinding exponent of one protocol party, a non-zero Ristretto255 scalar.
///
/// It is zeroized on drop and never printed, `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey {
    scalar: Scalar,
}

impl SecretKey {
    /// Samples a uniformly random non-zero scalar.
    ///
    /// 64 bytes are drawn from a ChaCha20 CSPRNG seeded by the operating system and reduced modulo the group order,
    /// which leaves a statistically negligible bias. Fails with `KeyGeneration` if the OS randomness source is unavailable.
    pub fn generate() -> Result<SecretKey, PSIError> {
        let mut rng = ChaCha20Rng::try_from_os_rng().map_err(|e| PSIError::KeyGeneration(e.to_string()))?;
        let mut wide = [0u8; 2 * SECRET_KEY_BYTE_LEN];

        for _ in 0..KEY_GENERATION_MAX_ATTEMPT_COUNT {
            rng.fill_bytes(&mut wide);
            let scalar = Scalar::from_bytes_mod_order_wide(&wide);
            wide.zeroize();

            if branch_opt_util::likely(scalar != Scalar::ZERO) {
                return Ok(SecretKey { scalar });
            }
        }

        branch_opt_util::cold();
        Err(PSIError::KeyGeneration(format!("sampled zero scalar {} times in a row", KEY_GENERATION_MAX_ATTEMPT_COUNT)))
    }

    /// Restores a secret key from its fixed-width byte form.
    ///
    /// Any 32 -bytes string is accepted and reduced modulo the group order, so that arbitrary fixed keys can be used for
    /// reproducible protocol runs. Fails if the length is wrong or the reduced scalar is zero.
    pub fn from_bytes(bytes: &[u8]) -> Result<SecretKey, PSIError> {
        let mut fixed: [u8; SECRET_KEY_BYTE_LEN] = bytes.try_into().map_err(|_| PSIError::InvalidKeyLength {
            expected: SECRET_KEY_BYTE_LEN,
            actual: bytes.len(),
        })?;

        let scalar = Scalar::from_bytes_mod_order(fixed);
        fixed.zeroize();

        if branch_opt_util::unlikely(scalar == Scalar::ZERO) {
            return Err(PSIError::InvalidSecretKey);
        }

        Ok(SecretKey { scalar })
    }

    /// Canonical little-endian encoding of the scalar, inverse of `from_bytes`.
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_BYTE_LEN] {
        self.scalar.to_bytes()
    }

    pub(crate) fn scalar(&self) -> &Scalar {
        &self.scalar
    }

    /// Multiplicative inverse, used by the client to strip its own blinding off a double-blinded element.
    pub(crate) fn invert(&self) -> SecretKey {
        SecretKey { scalar: self.scalar.invert() }
    }
}

impl Debug for SecretKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.scalar.zeroize();
    }
}

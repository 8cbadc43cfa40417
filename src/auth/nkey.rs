//! NKey (Ed25519, base32-encoded with a prefix byte and CRC-16/ARC
//! checksum) signing, via the `nkeys` crate used by the teacher lineage.

use crate::error::NKeyError;

/// A decoded NKey seed, capable of signing a server-provided nonce.
pub struct NKey {
    pair: nkeys::KeyPair,
}

impl NKey {
    /// Decodes a seed (`S...`) and derives its keypair.
    pub fn from_seed(seed: &str) -> Result<Self, NKeyError> {
        let pair = nkeys::KeyPair::from_seed(seed).map_err(|err| NKeyError::InvalidSeed {
            reason: err.to_string(),
        })?;
        Ok(NKey { pair })
    }

    /// The public user key, always beginning with `U`.
    pub fn public_key(&self) -> String {
        self.pair.public_key()
    }

    /// Signs the UTF-8 bytes of `nonce` and returns the base64 signature to
    /// place in `CONNECT`'s `sig` field.
    pub fn sign_nonce(&self, nonce: &str) -> Result<String, NKeyError> {
        if nonce.is_empty() {
            return Err(NKeyError::InvalidNonce);
        }
        let signature = self
            .pair
            .sign(nonce.as_bytes())
            .map_err(|err| NKeyError::SigningFailed {
                reason: err.to_string(),
            })?;
        Ok(base64_url::encode(&signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A syntactically well-formed but non-canonical seed is enough to
    // exercise the error path without embedding a real key in the repo.
    #[test]
    fn invalid_prefix_is_rejected() {
        assert!(NKey::from_seed("XBOGUS").is_err());
    }

    #[test]
    fn empty_seed_is_rejected() {
        assert!(NKey::from_seed("").is_err());
    }

    #[test]
    fn garbage_base32_is_rejected() {
        assert!(NKey::from_seed("S!!!not-base32!!!").is_err());
    }
}

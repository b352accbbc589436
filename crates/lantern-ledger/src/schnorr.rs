use k256::schnorr::signature::{Signer, Verifier};
use k256::schnorr::{Signature, SigningKey, VerifyingKey};

use lantern_core::WalletError;

/// Sign a 32-byte message with a secp256k1 secret scalar, BIP-340 style.
pub fn sign(secret: &[u8; 32], message: &[u8; 32]) -> Result<[u8; 64], WalletError> {
    let key = SigningKey::from_bytes(secret).map_err(|e| WalletError::SigningFailed(e.to_string()))?;
    let signature: Signature = key.sign(message);
    Ok(signature.to_bytes().into())
}

/// Verify a BIP-340 signature against an x-only public key.
pub fn verify(x_only: &[u8; 32], message: &[u8; 32], signature: &[u8; 64]) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(x_only) else {
        return false;
    };
    let Ok(signature) = Signature::try_from(signature.as_slice()) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn keypair() -> ([u8; 32], [u8; 32]) {
        let mut secret = [0u8; 32];
        loop {
            rand::thread_rng().fill_bytes(&mut secret);
            if let Ok(key) = SigningKey::from_bytes(&secret) {
                return (secret, key.verifying_key().to_bytes().into());
            }
        }
    }

    #[test]
    fn sign_verify_round_trip() {
        let (secret, x_only) = keypair();
        let message = [0x5au8; 32];
        let signature = sign(&secret, &message).unwrap();
        assert!(verify(&x_only, &message, &signature));
    }

    #[test]
    fn tampered_message_fails() {
        let (secret, x_only) = keypair();
        let signature = sign(&secret, &[1u8; 32]).unwrap();
        assert!(!verify(&x_only, &[2u8; 32], &signature));
    }

    #[test]
    fn wrong_key_fails() {
        let (secret, _) = keypair();
        let (_, other_key) = keypair();
        let message = [3u8; 32];
        let signature = sign(&secret, &message).unwrap();
        assert!(!verify(&other_key, &message, &signature));
    }
}

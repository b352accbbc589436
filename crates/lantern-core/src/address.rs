use bech32::primitives::decode::{CheckedHrpstring, CheckedHrpstringError};
use bech32::{Bech32m, Hrp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::WalletError;
use crate::types::NetworkTag;

// ── Address ──────────────────────────────────────────────────────────────────

/// Unshielded address: a network tag plus SHA-256 of the owner's x-only
/// public key. Serialized form is Bech32m with an `mn_addr…` prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub network: NetworkTag,
    pub payload: [u8; 32],
}

impl Address {
    pub fn new(network: NetworkTag, payload: [u8; 32]) -> Self {
        Self { network, payload }
    }

    /// Derive the address of an x-only public key on `network`.
    pub fn from_x_only_key(network: NetworkTag, x_only: &[u8; 32]) -> Self {
        let payload: [u8; 32] = Sha256::digest(x_only).into();
        Self { network, payload }
    }

    /// Bech32m string form.
    pub fn encode(&self) -> String {
        let hrp = Hrp::parse(&self.network.hrp()).expect("network hrp is valid ascii");
        bech32::encode::<Bech32m>(hrp, &self.payload).expect("32-byte payload fits bech32 limit")
    }

    /// Decode any Bech32m string into (hrp, payload bytes). Checksum is
    /// verified; no prefix or length policy is applied here.
    pub fn decode(s: &str) -> Result<(String, Vec<u8>), WalletError> {
        let checked = CheckedHrpstring::new::<Bech32m>(s).map_err(|e| match e {
            CheckedHrpstringError::Checksum(_) => WalletError::ChecksumMismatch,
            _ => WalletError::NotAnUnshieldedAddress,
        })?;
        let hrp = checked.hrp().to_string();
        let payload: Vec<u8> = checked.byte_iter().collect();
        Ok((hrp, payload))
    }

    /// Full recipient validation: Bech32m checksum, `mn_addr…` prefix,
    /// network agreement and 32-byte payload. Rejected inputs are never
    /// partially accepted.
    pub fn validate_recipient(s: &str, expected: NetworkTag) -> Result<Address, WalletError> {
        let (hrp, payload) = Self::decode(s)?;
        let network = NetworkTag::from_hrp(&hrp).ok_or(WalletError::NotAnUnshieldedAddress)?;
        if network != expected {
            return Err(WalletError::NetworkMismatch {
                expected: expected.to_string(),
                got: network.to_string(),
            });
        }
        if payload.len() != 32 {
            return Err(WalletError::BadLength {
                expected: 32,
                got: payload.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&payload);
        Ok(Address {
            network,
            payload: arr,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let enc = self.encode();
        write!(f, "Address({}…)", &enc[..enc.len().min(24)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETWORKS: [NetworkTag; 4] = [
        NetworkTag::Undeployed,
        NetworkTag::Test,
        NetworkTag::Preview,
        NetworkTag::Mainnet,
    ];

    #[test]
    fn encode_decode_round_trip() {
        for network in NETWORKS {
            let addr = Address::new(network, [0x42; 32]);
            let s = addr.encode();
            let (hrp, payload) = Address::decode(&s).unwrap();
            assert_eq!(NetworkTag::from_hrp(&hrp), Some(network));
            assert_eq!(payload, vec![0x42; 32]);
            assert_eq!(Address::validate_recipient(&s, network).unwrap(), addr);
        }
    }

    #[test]
    fn corrupting_any_data_char_fails_checksum() {
        let s = Address::new(NetworkTag::Test, [7u8; 32]).encode();
        let sep = s.rfind('1').unwrap();
        for i in sep + 1..s.len() {
            let mut corrupted: Vec<char> = s.chars().collect();
            corrupted[i] = if corrupted[i] == 'q' { 'p' } else { 'q' };
            let corrupted: String = corrupted.into_iter().collect();
            if corrupted == s {
                continue;
            }
            assert!(
                matches!(
                    Address::decode(&corrupted),
                    Err(WalletError::ChecksumMismatch)
                ),
                "position {i} did not fail the checksum"
            );
        }
    }

    #[test]
    fn wrong_network_is_rejected() {
        let s = Address::new(NetworkTag::Preview, [1u8; 32]).encode();
        assert!(matches!(
            Address::validate_recipient(&s, NetworkTag::Mainnet),
            Err(WalletError::NetworkMismatch { .. })
        ));
    }

    #[test]
    fn foreign_prefix_is_rejected() {
        let hrp = Hrp::parse("bc").unwrap();
        let s = bech32::encode::<Bech32m>(hrp, &[9u8; 32]).unwrap();
        assert!(matches!(
            Address::validate_recipient(&s, NetworkTag::Mainnet),
            Err(WalletError::NotAnUnshieldedAddress)
        ));
        assert!(matches!(
            Address::validate_recipient("definitely not bech32", NetworkTag::Test),
            Err(WalletError::NotAnUnshieldedAddress)
        ));
    }

    #[test]
    fn short_payload_is_bad_length() {
        let hrp = Hrp::parse("mn_addr_test").unwrap();
        let s = bech32::encode::<Bech32m>(hrp, &[9u8; 20]).unwrap();
        assert!(matches!(
            Address::validate_recipient(&s, NetworkTag::Test),
            Err(WalletError::BadLength {
                expected: 32,
                got: 20
            })
        ));
    }
}

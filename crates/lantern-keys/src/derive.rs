use bip32::{ChildNumber, XPrv};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use zeroize::Zeroizing;

use lantern_core::{Address, NetworkTag, WalletError, BIP44_PURPOSE, MIDNIGHT_COIN_TYPE};

// ── Role ─────────────────────────────────────────────────────────────────────

/// Key role within an account, the fourth path level. Only `NightExternal`
/// keys own unshielded addresses in this wallet; the remaining roles are
/// reserved for the dust and shielded subsystems.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    NightExternal = 0,
    NightInternal = 1,
    Dust = 2,
    Zswap = 3,
    Metadata = 4,
}

impl Role {
    pub fn index(self) -> u32 {
        self as u32
    }
}

// ── DerivedIdentity ──────────────────────────────────────────────────────────

/// A key materialized at `m / 44' / 2400' / account' / role / index`.
///
/// The secret scalar is wiped on drop; callers pass it to the ledger
/// boundary for signing and never persist it.
pub struct DerivedIdentity {
    pub role: Role,
    pub account: u32,
    pub index: u32,
    secret: Zeroizing<[u8; 32]>,
    pub public_key: [u8; 33],
    pub x_only_public_key: [u8; 32],
}

impl DerivedIdentity {
    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    /// The unshielded address of this key on `network`.
    pub fn address(&self, network: NetworkTag) -> Address {
        Address::from_x_only_key(network, &self.x_only_public_key)
    }
}

impl std::fmt::Debug for DerivedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DerivedIdentity {{ role: {:?}, account: {}, index: {} }}",
            self.role, self.account, self.index
        )
    }
}

// ── Derivation ───────────────────────────────────────────────────────────────

/// BIP-32 master key from the truncated wallet seed.
pub fn master_from_seed(seed: &crate::mnemonic::Seed) -> Result<XPrv, WalletError> {
    XPrv::new(seed.as_bytes()).map_err(|e| WalletError::BadParameter(e.to_string()))
}

/// One BIP-32 child step. Hardened indices live at `index + 2^31`.
pub fn derive_child(parent: &XPrv, index: u32, hardened: bool) -> Result<XPrv, WalletError> {
    let child = ChildNumber::new(index, hardened)
        .map_err(|e| WalletError::BadParameter(e.to_string()))?;
    parent
        .derive_child(child)
        .map_err(|_| WalletError::DerivationOutOfRange)
}

/// Materialize the identity at `m / 44' / 2400' / account' / role / index`.
///
/// If the leaf scalar falls out of range (ordinary BIP-32 probability,
/// about 2⁻¹²⁷) the next index is tried, per BIP-32.
pub fn identity(
    master: &XPrv,
    account: u32,
    role: Role,
    index: u32,
) -> Result<DerivedIdentity, WalletError> {
    let purpose = derive_child(master, BIP44_PURPOSE, true)?;
    let coin = derive_child(&purpose, MIDNIGHT_COIN_TYPE, true)?;
    let account_key = derive_child(&coin, account, true)?;
    let role_key = derive_child(&account_key, role.index(), false)?;

    let mut leaf_index = index;
    let leaf = loop {
        match derive_child(&role_key, leaf_index, false) {
            Ok(key) => break key,
            Err(WalletError::DerivationOutOfRange) => {
                leaf_index = leaf_index
                    .checked_add(1)
                    .ok_or(WalletError::DerivationOutOfRange)?;
            }
            Err(e) => return Err(e),
        }
    };

    let secret: Zeroizing<[u8; 32]> = Zeroizing::new(leaf.private_key().to_bytes().into());

    let mut public_key = [0u8; 33];
    public_key.copy_from_slice(
        leaf.public_key()
            .public_key()
            .to_encoded_point(true)
            .as_bytes(),
    );

    // BIP-340 x-only form; the schnorr key normalizes Y parity.
    let schnorr = k256::schnorr::SigningKey::from_bytes(secret.as_ref())
        .map_err(|e| WalletError::SigningFailed(e.to_string()))?;
    let x_only_public_key: [u8; 32] = schnorr.verifying_key().to_bytes().into();

    Ok(DerivedIdentity {
        role,
        account,
        index: leaf_index,
        secret,
        public_key,
        x_only_public_key,
    })
}

//! Boundary to the ledger cryptography and serialization.
//!
//! This is the only crate in the workspace that holds curve and signature
//! handles; every other crate passes plain byte arrays through it.

pub mod schnorr;
pub mod seal;

pub use schnorr::{sign, verify};
pub use seal::{
    binding_commitment, intent_signing_bytes, seal_transaction, BindingScheme, SealedTransaction,
};

pub mod derive;
pub mod mnemonic;

pub use derive::{derive_child, identity, master_from_seed, DerivedIdentity, Role};
pub use mnemonic::{generate, to_seed, validate, Seed};

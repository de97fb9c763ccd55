//! Request signing and client identities

pub mod certificate;
pub mod key;
pub mod signer;

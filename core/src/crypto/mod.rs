//! Cryptographic primitives module
//!
//! Peers hold an Ed25519 signing key pair generated once per installation.
//! Only the public half travels on the wire, inside the handshake.

pub mod signing;

pub use signing::Keypair;

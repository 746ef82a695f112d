//! Ed25519 key pair

use crate::types::{PeerKey, PUBLIC_KEY_LEN};
use crate::{Error, Result};
use rand::rngs::OsRng;

/// Ed25519 keypair
#[derive(Clone)]
pub struct Keypair {
    inner: ed25519_dalek::SigningKey,
}

impl Keypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let mut rng = OsRng;
        let inner = ed25519_dalek::SigningKey::generate(&mut rng);
        Self { inner }
    }

    /// Create keypair from secret key bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let inner = ed25519_dalek::SigningKey::from_bytes(bytes);
        Self { inner }
    }

    /// Restore a keypair from its hex-encoded secret
    pub fn from_hex(secret: &str) -> Result<Self> {
        let bytes = hex::decode(secret)
            .map_err(|e| Error::Crypto(format!("Invalid secret key encoding: {}", e)))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::Crypto(format!("Secret key must be 32 bytes, got {}", b.len()))
        })?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Get the secret key bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Hex-encoded secret for persistence
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Public key announced at handshake
    pub fn peer_key(&self) -> PeerKey {
        let bytes: [u8; PUBLIC_KEY_LEN] = self.inner.verifying_key().to_bytes();
        PeerKey(bytes)
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair").field("public", &self.peer_key()).finish()
    }
}

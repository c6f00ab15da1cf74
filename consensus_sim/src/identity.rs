//! Bootstrap peer identity: a secret key and the peer id derived from it.

use crate::error::{Result, SimError};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fmt;

/// Pre-shared secret of the bootstrap node used when no seed is given.
pub const DEFAULT_SECRET_KEY: &str =
    "0xabcdabcdabcdabcdabcdabcdabcdabcdabcdabcdabcdabcdabcdabcdabcdabcd";

/// Peer id the node derives from [`DEFAULT_SECRET_KEY`].
pub const DEFAULT_PEER_ID: &str = "12D3KooWDFYi71juk6dYWo3UDvqs5gAzGDc124LSvcR5d187Tdvi";

/// Protobuf header of a libp2p `PublicKey { type: Ed25519, data: <32 bytes> }`.
const ED25519_PUBKEY_PROTOBUF_PREFIX: [u8; 4] = [0x08, 0x01, 0x12, 0x20];

/// Multihash code of the identity hash function.
const MULTIHASH_IDENTITY: u8 = 0x00;

/// The matched (secret key, peer id) pair of the bootstrap node.
///
/// Both halves always come out of one derivation, so the key the bootstrap
/// node is launched with and the peer id other nodes dial cannot drift
/// apart.
#[derive(Clone)]
pub struct BootstrapIdentity {
    signing_key: SigningKey,
    peer_id: String,
}

impl BootstrapIdentity {
    /// The fixed pre-shared identity.
    pub fn fixed() -> Result<Self> {
        Self::from_secret_hex(DEFAULT_SECRET_KEY)
    }

    /// Derives the identity from a `0x`-prefixed (or bare) 32 byte hex key.
    pub fn from_secret_hex(secret: &str) -> Result<Self> {
        let digits = secret.strip_prefix("0x").unwrap_or(secret);
        let bytes = hex::decode(digits).map_err(|e| SimError::InvalidIdentity(e.to_string()))?;
        let secret: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            SimError::InvalidIdentity(format!("secret key must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self::from_signing_key(SigningKey::from_bytes(&secret)))
    }

    /// Derives a fresh identity from a seed.
    ///
    /// Same seed always yields the same key, so runs stay reproducible.
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Self::from_signing_key(SigningKey::generate(&mut rng))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let peer_id = peer_id_from_public_key(&signing_key.verifying_key());
        Self {
            signing_key,
            peer_id,
        }
    }

    /// Secret key in the `0x…` form accepted by `--network.secret_key`.
    pub fn secret_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signing_key.to_bytes()))
    }

    /// Base58 libp2p peer id (`12D3KooW…`).
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Checks that the stored peer id still matches the secret key.
    pub fn verify(&self) -> Result<()> {
        let expected = peer_id_from_public_key(&self.signing_key.verifying_key());
        if expected == self.peer_id {
            Ok(())
        } else {
            Err(SimError::InvalidIdentity(format!(
                "peer id {} does not match secret key (expected {})",
                self.peer_id, expected
            )))
        }
    }

    /// Discovery multiaddress of a bootstrap node listening on `port`.
    pub fn multiaddr(&self, port: u16) -> String {
        format!("/ip4/127.0.0.1/tcp/{}/p2p/{}", port, self.peer_id)
    }
}

impl fmt::Debug for BootstrapIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapIdentity")
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}

/// libp2p peer id of an Ed25519 key: base58(identity-multihash(protobuf(key))).
fn peer_id_from_public_key(key: &VerifyingKey) -> String {
    let mut encoded = Vec::with_capacity(2 + ED25519_PUBKEY_PROTOBUF_PREFIX.len() + 32);
    encoded.push(MULTIHASH_IDENTITY);
    encoded.push((ED25519_PUBKEY_PROTOBUF_PREFIX.len() + 32) as u8);
    encoded.extend_from_slice(&ED25519_PUBKEY_PROTOBUF_PREFIX);
    encoded.extend_from_slice(key.as_bytes());
    bs58::encode(encoded).into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_identity_matches_preshared_peer_id() {
        let identity = BootstrapIdentity::fixed().unwrap();

        assert_eq!(identity.peer_id(), DEFAULT_PEER_ID);
        assert_eq!(identity.secret_key_hex(), DEFAULT_SECRET_KEY);
        identity.verify().unwrap();
    }

    #[test]
    fn test_seeded_identity_deterministic() {
        let id1 = BootstrapIdentity::from_seed(42);
        let id2 = BootstrapIdentity::from_seed(42);
        let id3 = BootstrapIdentity::from_seed(43);

        assert_eq!(id1.peer_id(), id2.peer_id());
        assert_eq!(id1.secret_key_hex(), id2.secret_key_hex());
        assert_ne!(id1.peer_id(), id3.peer_id());
        assert!(id1.peer_id().starts_with("12D3KooW"));
    }

    #[test]
    fn test_roundtrip_through_hex() {
        let id = BootstrapIdentity::from_seed(7);
        let reparsed = BootstrapIdentity::from_secret_hex(&id.secret_key_hex()).unwrap();

        assert_eq!(id.peer_id(), reparsed.peer_id());
    }

    #[test]
    fn test_tampered_peer_id_fails_verify() {
        let mut id = BootstrapIdentity::from_seed(1);
        id.peer_id = DEFAULT_PEER_ID.to_string();

        assert!(id.verify().is_err());
    }

    #[test]
    fn test_malformed_secret_rejected() {
        assert!(BootstrapIdentity::from_secret_hex("0xzz").is_err());
        assert!(BootstrapIdentity::from_secret_hex("0xabcd").is_err());
    }

    #[test]
    fn test_multiaddr() {
        let id = BootstrapIdentity::fixed().unwrap();
        assert_eq!(
            id.multiaddr(4001),
            format!("/ip4/127.0.0.1/tcp/4001/p2p/{}", DEFAULT_PEER_ID)
        );
    }
}

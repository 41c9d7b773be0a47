//! The key a peer hands over during key exchange.

use std::fmt;

use ether_protocol::Hex;
use sha2::{Digest, Sha256};

/// Length of a [`SessionKey`] id in bytes.
pub const KEY_ID_LEN: usize = 8;

/// A peer's key and the short id derived from it.
///
/// The id is the first eight bytes of SHA-256 over the key. It only labels
/// the key in logs and carries no security weight.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey {
    key: Vec<u8>,
    id: [u8; KEY_ID_LEN],
}

impl SessionKey {
    pub fn new(key: Vec<u8>) -> Self {
        let digest = Sha256::digest(&key);
        let mut id = [0u8; KEY_ID_LEN];
        id.copy_from_slice(&digest[..KEY_ID_LEN]);
        Self { key, id }
    }

    pub fn id(&self) -> [u8; KEY_ID_LEN] {
        self.id
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

// Never print key material.
impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("id", &Hex(&self.id))
            .field("len", &self.key.len())
            .finish()
    }
}

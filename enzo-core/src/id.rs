//! Message identifiers and their printable correlation tokens.

use std::fmt;

use rand::RngCore;

/// Number of raw bytes in a message id.
pub const ID_LENGTH: usize = 10;

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Encode raw bytes into a printable token of the same length.
///
/// Each byte is reduced modulo 64 and mapped onto `0-9a-z`, `A-Z`, `_`
/// and `-`. Distinct inputs whose residues are equal produce the same
/// token.
pub fn encode_token(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| match b & 63 {
            v @ 0..=35 => DIGITS[v as usize] as char,
            v @ 36..=61 => (b'A' + (v - 36)) as char,
            62 => '_',
            _ => '-',
        })
        .collect()
}

// ── MessageId ────────────────────────────────────────────────────

/// The opaque 10-byte correlation id carried by every frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MessageId([u8; ID_LENGTH]);

impl MessageId {
    pub fn new(bytes: [u8; ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// A fresh id drawn from the thread-local RNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; ID_LENGTH];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }

    /// The token used to look this id up among pending requests.
    pub fn token(&self) -> String {
        encode_token(&self.0)
    }
}

impl From<[u8; ID_LENGTH]> for MessageId {
    fn from(bytes: [u8; ID_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.token())
    }
}

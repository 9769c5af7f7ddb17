// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Primitives consumed by the catalog and the staging channel.
//!
//! The catalog only needs a content hash and a stream cipher; both are traits
//! so that a board can plug in its hardware engines. The default
//! implementations use RustCrypto.

use consts::{DEFAULT_SHARED_KEY, DEFAULT_SHARED_NONCE};
use ctr::cipher::generic_array::GenericArray;
use ctr::cipher::{KeyIvInit, StreamCipher};
use sha2::Digest as _;

use crate::record::Digest;

/// Incremental content hash.
pub trait ContentHasher {
    fn reset(&mut self);

    fn update(&mut self, data: &[u8]);

    /// Finish the hash and reset the hasher for the next use.
    fn finalize(&mut self) -> Digest;

    /// Hash `data` in one go.
    fn hash(&mut self, data: &[u8]) -> Digest {
        self.reset();
        self.update(data);
        self.finalize()
    }
}

/// SHA-256.
#[derive(Default, Clone)]
pub struct Sha256Hasher(sha2::Sha256);

impl ContentHasher for Sha256Hasher {
    fn reset(&mut self) {
        sha2::Digest::reset(&mut self.0);
    }

    fn update(&mut self, data: &[u8]) {
        sha2::Digest::update(&mut self.0, data);
    }

    fn finalize(&mut self) -> Digest {
        self.0.finalize_reset().into()
    }
}

/// Key material shared by the staging writer and the loader.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey {
    pub key: [u8; 32],
    /// Initial counter block.
    pub nonce: [u8; 16],
}

impl SessionKey {
    pub fn new(key: [u8; 32], nonce: [u8; 16]) -> Self {
        Self { key, nonce }
    }

    /// Build a key from an 8 byte nonce. The low half of the counter block
    /// starts at zero.
    pub fn from_parts(key: [u8; 32], nonce: [u8; 8]) -> Self {
        let mut block = [0; 16];
        block[..8].copy_from_slice(&nonce);
        Self { key, nonce: block }
    }

    /// The built-in key compiled into both boot stages.
    pub fn shared_default() -> Self {
        Self::from_parts(DEFAULT_SHARED_KEY, DEFAULT_SHARED_NONCE)
    }

    pub fn is_shared_default(&self) -> bool {
        *self == Self::shared_default()
    }
}

impl core::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionKey")
            .field("key", &"<redacted>")
            .field("nonce", &self.nonce)
            .finish()
    }
}

/// Symmetric keystream. Encryption and decryption are the same operation and
/// successive calls continue the stream.
pub trait Keystream {
    fn init(key: &SessionKey) -> Self;

    fn crypt_in_place(&mut self, buf: &mut [u8]);
}

/// AES-256 in CTR mode with a 128-bit big-endian counter.
pub struct Aes256Ctr(ctr::Ctr128BE<aes::Aes256>);

impl Keystream for Aes256Ctr {
    fn init(key: &SessionKey) -> Self {
        Self(ctr::Ctr128BE::<aes::Aes256>::new(
            GenericArray::from_slice(&key.key),
            GenericArray::from_slice(&key.nonce),
        ))
    }

    fn crypt_in_place(&mut self, buf: &mut [u8]) {
        self.0.apply_keystream(buf);
    }
}

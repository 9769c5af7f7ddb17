// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use core::marker::PhantomData;

use consts::STAGING_PAYLOAD_OFFSET;
use tracing::info;

use crate::channel::{self, ChannelError};
use crate::crypto::{Aes256Ctr, Keystream, SessionKey};
use crate::Error;

/// Producer side of the staging handoff.
///
/// Takes the window by `&mut` for the duration of a call, so two stagings can
/// never interleave.
pub struct StagingWriter<K = Aes256Ctr> {
    key: SessionKey,
    _keystream: PhantomData<K>,
}

impl<K: Keystream> StagingWriter<K> {
    pub fn new(key: SessionKey) -> Self {
        Self {
            key,
            _keystream: PhantomData,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Copy `image` into the window and seal it. Everything previously in the
    /// window is overwritten.
    pub fn stage(&self, window: &mut [u8], image: &[u8]) -> Result<(), Error> {
        let capacity = channel::capacity(window.len());
        if image.len() > capacity {
            return Err(Error::ImageTooLarge {
                len: image.len(),
                capacity,
            });
        }
        channel::payload_region(window)[..image.len()].copy_from_slice(image);
        self.seal(window, image.len())
    }

    /// Frame and encrypt a payload of `len` bytes already loaded at the
    /// payload offset.
    pub fn seal(&self, window: &mut [u8], len: usize) -> Result<(), Error> {
        channel::frame(window, len).map_err(|e| match e {
            ChannelError::Overrun { len, capacity } => Error::ImageTooLarge { len, capacity },
            _ => Error::ImageTooLarge {
                len,
                capacity: channel::capacity(window.len()),
            },
        })?;
        let payload = &mut window[STAGING_PAYLOAD_OFFSET..STAGING_PAYLOAD_OFFSET + len];
        K::init(&self.key).crypt_in_place(payload);
        info!("staged {} bytes", len);
        Ok(())
    }
}

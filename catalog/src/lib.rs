// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Install catalog kept on NOR flash and the encrypted staging handoff to the
//! OS-side loader.
//!
//! Everything in here is `no_std` and allocation free so that the same code
//! runs in the pre-OS shell and in the host tooling.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod channel;
pub mod crypto;
mod error;
pub mod flash;
pub mod manifest;
pub mod media;
pub mod ram_flash;
pub mod record;
pub mod service;
pub mod staging;

pub use {
    crypto::{Aes256Ctr, ContentHasher, Keystream, SessionKey, Sha256Hasher},
    error::{Error, ErrorKind},
    flash::{Bootstrap, FlashTable, PageState},
    manifest::{GameManifest, ManifestError},
    media::{MediaError, MediaReader},
    ram_flash::{RamFlash, RamFlashError},
    record::{Digest, InstallRecord, Status, Title, UserName},
    service::{CatalogService, DowngradeCheck, InstallOutcome},
    staging::StagingWriter,
};

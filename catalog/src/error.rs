// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use embedded_storage::nor_flash::NorFlashErrorKind;

use crate::manifest::ManifestError;
use crate::media::MediaError;

/// Broad class of a catalog failure, used by front ends to decide how to
/// report it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    /// Bad arguments, unknown title, unauthorized user. The table is unchanged.
    Validation,
    /// Digest mismatch, downgrade attempt, damaged table. Nothing launchable is
    /// produced.
    Integrity,
    /// Flash, media or memory I/O failed.
    Device,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    AlreadyInstalled,
    CorruptRow { index: usize },
    /// The sentinel is neither erased nor valid.
    CorruptSentinel,
    DigestMismatch,
    Downgrade { installed: (u32, u32), candidate: (u32, u32) },
    Flash(NorFlashErrorKind),
    ImageTooLarge { len: usize, capacity: usize },
    Manifest(ManifestError),
    Media(MediaError),
    MissingSentinel,
    NotInstalled,
    OwnerTooLong,
    TableFull,
    TitleMismatch,
    TitleTooLong,
    Unauthorized,
    UnsupportedGeometry,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ImageTooLarge { .. }
            | Self::Manifest(_)
            | Self::NotInstalled
            | Self::OwnerTooLong
            | Self::TableFull
            | Self::TitleMismatch
            | Self::TitleTooLong
            | Self::Unauthorized => ErrorKind::Validation,
            Self::AlreadyInstalled
            | Self::CorruptRow { .. }
            | Self::CorruptSentinel
            | Self::DigestMismatch
            | Self::Downgrade { .. }
            | Self::MissingSentinel => ErrorKind::Integrity,
            Self::Flash(_) | Self::Media(_) | Self::UnsupportedGeometry => ErrorKind::Device,
        }
    }
}

impl From<ManifestError> for Error {
    fn from(e: ManifestError) -> Self {
        Error::Manifest(e)
    }
}

impl From<MediaError> for Error {
    fn from(e: MediaError) -> Self {
        Error::Media(e)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AlreadyInstalled => write!(f, "title already has an installed row"),
            Self::CorruptRow { index } => write!(f, "catalog row {index} is corrupt"),
            Self::CorruptSentinel => {
                write!(f, "catalog sentinel corrupt, flash needs a factory reset")
            }
            Self::DigestMismatch => write!(f, "image digest does not match the installed digest"),
            Self::Downgrade {
                installed: (major, minor),
                candidate: (cand_major, cand_minor),
            } => write!(
                f,
                "refusing downgrade from {major}.{minor} to {cand_major}.{cand_minor}"
            ),
            Self::Flash(kind) => write!(f, "flash error: {kind:?}"),
            Self::ImageTooLarge { len, capacity } => write!(
                f,
                "image of {len} bytes does not fit the staging window ({capacity} bytes)"
            ),
            Self::Manifest(e) => write!(f, "invalid game manifest: {e}"),
            Self::Media(e) => write!(f, "media error: {e}"),
            Self::MissingSentinel => write!(f, "catalog sentinel missing, flash needs a reset"),
            Self::NotInstalled => write!(f, "game is not installed"),
            Self::OwnerTooLong => write!(f, "user name too long"),
            Self::TableFull => write!(f, "catalog table is full"),
            Self::TitleMismatch => write!(f, "manifest title does not match the requested title"),
            Self::TitleTooLong => write!(f, "title too long"),
            Self::Unauthorized => write!(f, "user is not allowed to play this game"),
            Self::UnsupportedGeometry => write!(f, "flash geometry not supported by the catalog"),
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Manifest(e) => Some(e),
            Self::Media(e) => Some(e),
            _ => None,
        }
    }
}

// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Game manifest: the framing lines at the top of every provisioned image.
//!
//! ```text
//! version:1.0
//! name:chess
//! users:alice carol
//! public_key:...
//! <executable bytes>
//! ```

use core::fmt::Write;

use consts::{FRAMING_LINES, MAX_MANIFEST_USERS};

use crate::record::{Title, UserName};

/// Media file name: `<title>-v<version>`, the version as written in the
/// manifest.
pub type MediaName = heapless::String<64>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ManifestError {
    /// Fewer than four complete lines in the bytes given.
    Truncated,
    /// Line `line` (zero based) does not start with the expected key.
    UnexpectedKey { line: usize },
    NotUtf8,
    InvalidVersion,
    InvalidTitle,
    TitleTooLong,
    UserTooLong,
    TooManyUsers,
}

impl core::fmt::Display for ManifestError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Truncated => write!(f, "manifest lines missing"),
            Self::UnexpectedKey { line } => write!(f, "unexpected key on manifest line {}", line + 1),
            Self::NotUtf8 => write!(f, "manifest is not valid UTF-8"),
            Self::InvalidVersion => write!(f, "invalid version, expected <major>[.<minor>]"),
            Self::InvalidTitle => write!(f, "invalid title"),
            Self::TitleTooLong => write!(f, "title too long"),
            Self::UserTooLong => write!(f, "user name too long"),
            Self::TooManyUsers => write!(f, "more than {MAX_MANIFEST_USERS} users"),
        }
    }
}

impl core::error::Error for ManifestError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameManifest {
    pub title: Title,
    pub major: u32,
    pub minor: u32,
    pub users: heapless::Vec<UserName, MAX_MANIFEST_USERS>,
    /// Length of the framing lines, newlines included. The executable starts
    /// right after them.
    pub framing_len: usize,
}

impl GameManifest {
    /// Parse the manifest at the start of `image`. Only the framing lines
    /// need to be present.
    pub fn parse(image: &[u8]) -> Result<Self, ManifestError> {
        let mut lines: [&[u8]; FRAMING_LINES] = [&[]; FRAMING_LINES];
        let mut framing_len = 0;
        for line in lines.iter_mut() {
            let rest = &image[framing_len..];
            let end = rest
                .iter()
                .position(|&b| b == b'\n')
                .ok_or(ManifestError::Truncated)?;
            *line = &rest[..end];
            framing_len += end + 1;
        }

        let version = text_field(lines[0], b"version:", 0)?;
        let title = text_field(lines[1], b"name:", 1)?;
        let users = text_field(lines[2], b"users:", 2)?;
        // The key itself is opaque.
        if !lines[3].starts_with(b"public_key:") {
            return Err(ManifestError::UnexpectedKey { line: 3 });
        }

        let (major, minor) = parse_version(version)?;
        if title.is_empty() || title.contains(|c: char| c == '/' || c.is_whitespace()) {
            return Err(ManifestError::InvalidTitle);
        }
        let title = Title::try_from(title).map_err(|_| ManifestError::TitleTooLong)?;

        let mut allowed = heapless::Vec::new();
        for user in users.split_ascii_whitespace() {
            let user = UserName::try_from(user).map_err(|_| ManifestError::UserTooLong)?;
            allowed.push(user).map_err(|_| ManifestError::TooManyUsers)?;
        }

        Ok(Self {
            title,
            major,
            minor,
            users: allowed,
            framing_len,
        })
    }

    pub fn version(&self) -> (u32, u32) {
        (self.major, self.minor)
    }

    pub fn is_authorized(&self, user: &str) -> bool {
        self.users.iter().any(|u| u == user)
    }

    pub fn media_name(&self) -> MediaName {
        media_name(&self.title, self.major, self.minor)
    }

    /// Whether `name` is one of the names this image may be stored under.
    pub fn is_media_name(&self, name: &str) -> bool {
        media_names(&self.title, self.major, self.minor)
            .iter()
            .any(|n| n == name)
    }
}

/// Name under which `title` at version `major.minor` is stored on media.
pub fn media_name(title: &str, major: u32, minor: u32) -> MediaName {
    let mut name = MediaName::new();
    // Title is at most 31 bytes and each number at most 10 digits, so this
    // always fits.
    let _ = write!(name, "{title}-v{major}.{minor}");
    name
}

/// Every name `title` at version `major.minor` may be stored under, in the
/// order to look for them. Images are named after the version text of their
/// manifest, so version 2.0 may be `go-v2.0` or `go-v2`.
pub fn media_names(title: &str, major: u32, minor: u32) -> heapless::Vec<MediaName, 2> {
    let mut names = heapless::Vec::new();
    let _ = names.push(media_name(title, major, minor));
    if minor == 0 {
        let mut short = MediaName::new();
        let _ = write!(short, "{title}-v{major}");
        let _ = names.push(short);
    }
    names
}

fn text_field<'a>(line: &'a [u8], key: &[u8], index: usize) -> Result<&'a str, ManifestError> {
    let value = line
        .strip_prefix(key)
        .ok_or(ManifestError::UnexpectedKey { line: index })?;
    let value = core::str::from_utf8(value).map_err(|_| ManifestError::NotUtf8)?;
    Ok(value.trim_end_matches('\r'))
}

fn parse_version(version: &str) -> Result<(u32, u32), ManifestError> {
    let (major, minor) = match version.split_once('.') {
        Some((major, minor)) => (major, minor),
        None => (version, "0"),
    };
    let number = |s: &str| {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ManifestError::InvalidVersion);
        }
        s.parse::<u32>().map_err(|_| ManifestError::InvalidVersion)
    };
    Ok((number(major)?, number(minor)?))
}

// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Layout constants shared by the pre-OS catalog and the post-boot loader.
//! Both sides of the staging handoff must agree on every value in here.

#![no_std]

/// Size of a flash erase page in bytes (64KB).
/// Any bit transition from 0 to 1 needs the whole page to be erased and
/// rewritten, so every catalog mutation is planned against this granularity.
pub const FLASH_PAGE_SIZE: usize = 64 * 1024;

/// Default offset of the catalog page inside the flash device.
/// The sentinel sits at the very start of the page and rows follow it.
pub const CATALOG_BASE: u32 = 0x0;

/// Magic value written at the start of the catalog page once it has been
/// initialized ("GCAT").
pub const CATALOG_MAGIC: [u8; 4] = *b"GCAT";

/// Length of the catalog sentinel in bytes.
pub const SENTINEL_LEN: usize = CATALOG_MAGIC.len();

/// Width of the title field: 31 characters plus a NUL terminator.
pub const TITLE_LEN: usize = 32;

/// Width of the owning user field: 15 characters plus a NUL terminator.
pub const OWNER_LEN: usize = 16;

/// Width of the content digest field. The digest is stored as raw SHA-256
/// output, not as hex text.
pub const DIGEST_LEN: usize = 32;

/// Width of a single catalog row.
/// status (1) + title + major (4) + minor (4) + owner + digest
pub const ROW_LEN: usize = 1 + TITLE_LEN + 4 + 4 + OWNER_LEN + DIGEST_LEN;

/// Number of rows that fit in the catalog page after the sentinel.
pub const MAX_ROWS: usize = (FLASH_PAGE_SIZE - SENTINEL_LEN) / ROW_LEN;

/// Maximum number of users a game manifest can authorize.
pub const MAX_MANIFEST_USERS: usize = 5;

/// The manifest lines must all end within this many bytes from the start of
/// an image.
pub const MAX_MANIFEST_LEN: usize = 4096;

/// Physical base address of the staging window in DDR.
/// The region is reserved in the device tree so the OS never hands it out.
pub const STAGING_WINDOW_BASE: u64 = 0x1FC0_0000;

/// Size of the staging window (4MB).
pub const STAGING_WINDOW_SIZE: usize = 0x40_0000;

/// Length of the little-endian payload size header at window offset 0.
pub const SIZE_HEADER_LEN: usize = 4;

/// Offset of the encrypted payload inside the staging window.
pub const STAGING_PAYLOAD_OFFSET: usize = 0x40;

/// Largest payload the staging window can carry.
pub const MAX_STAGED_PAYLOAD: usize = STAGING_WINDOW_SIZE - STAGING_PAYLOAD_OFFSET;

/// Number of newline-terminated manifest lines at the top of every game image.
/// The loader strips them so the remaining bytes are a plain executable.
pub const FRAMING_LINES: usize = 4;

/// Built-in AES-256 key shared by the staging writer and the loader.
///
/// This is a fixed constant compiled into both stages, not a provisioned
/// secret. Anyone holding either binary can decrypt a staged image. Devices
/// should be given their own key through configuration.
pub const DEFAULT_SHARED_KEY: [u8; 32] = *b"z8TpeEqmubuwlBFBIB4JPs1NozwVgbzj";

/// Built-in nonce shared by the staging writer and the loader.
/// Occupies the first half of the CTR counter block; the second half is the
/// block counter and starts at zero.
pub const DEFAULT_SHARED_NONCE: [u8; 8] = *b"PoD9SR38";

/// Memory device the loader reads the staging window from.
pub const DEFAULT_MEM_PATH: &str = "/dev/mem";

/// Where the loader writes the launchable game.
pub const DEFAULT_GAME_PATH: &str = "/usr/bin/game";

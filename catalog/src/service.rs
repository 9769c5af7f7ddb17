// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Install, uninstall and play policy on top of the flash table.

use consts::MAX_MANIFEST_LEN;
use embedded_storage::nor_flash::{MultiwriteNorFlash, NorFlash};
use tracing::{debug, info, warn};

use crate::channel;
use crate::crypto::{Aes256Ctr, ContentHasher, Keystream, Sha256Hasher};
use crate::flash::FlashTable;
use crate::manifest::{media_names, GameManifest, MediaName};
use crate::media::{MediaError, MediaReader};
use crate::record::{Digest, InstallRecord, UserName};
use crate::staging::StagingWriter;
use crate::Error;

/// Chunk size used when streaming images from media.
const CHUNK: usize = 4096;

/// How a candidate version relates to what is installed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DowngradeCheck {
    /// Nothing installed under this title.
    Fresh,
    /// Same version as installed.
    Reinstall,
    /// Strictly newer than the installed version.
    Upgrade { installed: (u32, u32) },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed(InstallRecord),
    Upgraded { from: (u32, u32), record: InstallRecord },
    /// The same version was already installed; the table was not touched.
    Unchanged(InstallRecord),
}

pub struct CatalogService<F, M, H = Sha256Hasher, K = Aes256Ctr> {
    table: FlashTable<F>,
    media: M,
    hasher: H,
    writer: StagingWriter<K>,
}

impl<F, M, H, K> CatalogService<F, M, H, K>
where
    F: NorFlash + MultiwriteNorFlash,
    M: MediaReader,
    H: ContentHasher,
    K: Keystream,
{
    pub fn new(table: FlashTable<F>, media: M, hasher: H, writer: StagingWriter<K>) -> Self {
        Self {
            table,
            media,
            hasher,
            writer,
        }
    }

    pub fn table(&mut self) -> &mut FlashTable<F> {
        &mut self.table
    }

    pub fn media(&mut self) -> &mut M {
        &mut self.media
    }

    pub fn into_parts(self) -> (FlashTable<F>, M) {
        (self.table, self.media)
    }

    pub fn is_installed(&mut self, title: &str) -> Result<bool, Error> {
        Ok(self.table.find_by_title(title)?.is_some())
    }

    /// Installed records in table order.
    pub fn list(&mut self) -> impl Iterator<Item = Result<InstallRecord, Error>> + '_ {
        self.table.installed()
    }

    /// Versions compare as `(major, minor)` pairs. Anything older than the
    /// installed version is rejected.
    pub fn check_downgrade(
        &mut self,
        title: &str,
        major: u32,
        minor: u32,
    ) -> Result<DowngradeCheck, Error> {
        let Some(record) = self.table.find_by_title(title)? else {
            return Ok(DowngradeCheck::Fresh);
        };
        let installed = record.version();
        let candidate = (major, minor);
        match candidate.cmp(&installed) {
            core::cmp::Ordering::Less => Err(Error::Downgrade {
                installed,
                candidate,
            }),
            core::cmp::Ordering::Equal => Ok(DowngradeCheck::Reinstall),
            core::cmp::Ordering::Greater => Ok(DowngradeCheck::Upgrade { installed }),
        }
    }

    pub fn check_user_authorized(&self, manifest: &GameManifest, user: &str) -> Result<(), Error> {
        if manifest.is_authorized(user) {
            Ok(())
        } else {
            warn!("{} is not allowed to play {}", user, manifest.title.as_str());
            Err(Error::Unauthorized)
        }
    }

    /// Parse the manifest of the named media image.
    pub fn read_manifest(&mut self, name: &str) -> Result<GameManifest, Error> {
        let len = self.media.image_len(name)? as usize;
        let mut buf = [0; MAX_MANIFEST_LEN];
        let head = &mut buf[..len.min(MAX_MANIFEST_LEN)];
        self.media.read_exact_at(name, 0, head)?;
        Ok(GameManifest::parse(head)?)
    }

    /// Hash the whole media image of an installed title and compare it with
    /// the recorded digest.
    pub fn verify_digest(&mut self, title: &str) -> Result<(), Error> {
        let record = self.table.find_by_title(title)?.ok_or(Error::NotInstalled)?;
        let name = self.find_media(&record)?;
        if self.digest_media(&name)? != record.digest {
            warn!("digest mismatch for {}", name.as_str());
            return Err(Error::DigestMismatch);
        }
        debug!("digest of {} verified", name.as_str());
        Ok(())
    }

    /// Install the media image `image` for `user`.
    ///
    /// Nothing in the table changes unless every check passed and there is
    /// room for the new row.
    pub fn install(&mut self, image: &str, user: &str) -> Result<InstallOutcome, Error> {
        let manifest = self.read_manifest(image)?;
        if !manifest.is_media_name(image) {
            return Err(Error::TitleMismatch);
        }
        let owner = UserName::try_from(user).map_err(|_| Error::OwnerTooLong)?;

        let check = self.check_downgrade(&manifest.title, manifest.major, manifest.minor)?;
        if check == DowngradeCheck::Reinstall {
            let record = self.table.find_by_title(&manifest.title)?.ok_or(Error::NotInstalled)?;
            info!("{} already installed", image);
            return Ok(InstallOutcome::Unchanged(record));
        }

        let digest = self.digest_media(image)?;
        let record =
            InstallRecord::installed(&manifest.title, manifest.major, manifest.minor, &owner, digest)?;
        if self.table.free_rows()? == 0 {
            return Err(Error::TableFull);
        }

        match check {
            DowngradeCheck::Upgrade { installed } => {
                self.table.mark_removed(&manifest.title)?;
                self.table.append(&record)?;
                info!(
                    "{} upgraded from {}.{} for {}",
                    image, installed.0, installed.1, user
                );
                Ok(InstallOutcome::Upgraded {
                    from: installed,
                    record,
                })
            }
            _ => {
                self.table.append(&record)?;
                info!("{} installed for {}", image, user);
                Ok(InstallOutcome::Installed(record))
            }
        }
    }

    pub fn uninstall(&mut self, title: &str) -> Result<InstallRecord, Error> {
        let record = self.table.mark_removed(title)?;
        info!("{} uninstalled", title);
        Ok(record)
    }

    /// Load the installed image of `title` into the staging window and seal
    /// it for the loader. Returns the staged payload length.
    ///
    /// On any failure after loading started the window is scrubbed, so
    /// nothing launchable is left behind.
    pub fn play(&mut self, title: &str, user: &str, window: &mut [u8]) -> Result<usize, Error> {
        let record = self.table.find_by_title(title)?.ok_or(Error::NotInstalled)?;
        let name = self.find_media(&record)?;
        let manifest = self.read_manifest(&name)?;
        if manifest.title != record.title {
            return Err(Error::TitleMismatch);
        }
        self.check_user_authorized(&manifest, user)?;

        let len = self.media.image_len(&name)? as usize;
        let capacity = channel::capacity(window.len());
        if len > capacity {
            return Err(Error::ImageTooLarge { len, capacity });
        }

        let payload = &mut channel::payload_region(window)[..len];
        if let Err(e) = self.load_verified(&name, &record.digest, payload) {
            channel::scrub(window);
            return Err(e);
        }
        if let Err(e) = self.writer.seal(window, len) {
            channel::scrub(window);
            return Err(e);
        }
        info!("{} staged for {}", name.as_str(), user);
        Ok(len)
    }

    /// Name of the media image an installed record was installed from.
    fn find_media(&mut self, record: &InstallRecord) -> Result<MediaName, Error> {
        for name in media_names(&record.title, record.major, record.minor) {
            match self.media.image_len(&name) {
                Ok(_) => return Ok(name),
                Err(MediaError::NotFound) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(MediaError::NotFound.into())
    }

    /// Read a media image into `out` while hashing it.
    fn load_verified(&mut self, name: &str, expected: &Digest, out: &mut [u8]) -> Result<(), Error> {
        self.hasher.reset();
        for (i, chunk) in out.chunks_mut(CHUNK).enumerate() {
            self.media.read_exact_at(name, (i * CHUNK) as u32, chunk)?;
            self.hasher.update(chunk);
        }
        if self.hasher.finalize() != *expected {
            warn!("digest mismatch for {}", name);
            return Err(Error::DigestMismatch);
        }
        Ok(())
    }

    fn digest_media(&mut self, name: &str) -> Result<Digest, Error> {
        let len = self.media.image_len(name)? as usize;
        let mut buf = [0; CHUNK];
        self.hasher.reset();
        let mut offset = 0;
        while offset < len {
            let chunk = &mut buf[..CHUNK.min(len - offset)];
            self.media.read_exact_at(name, offset as u32, chunk)?;
            self.hasher.update(chunk);
            offset += chunk.len();
        }
        Ok(self.hasher.finalize())
    }
}

//! SD card day-file store.
//!
//! Implements [`FileStore`] on top of `std::fs`, rooted at the card's
//! mount point.  On ESP-IDF the card sits on SPI3 (CS 13, SCLK 14,
//! MOSI 15, MISO 4) and is mounted as FAT through the VFS, so the same
//! path-based code serves both targets; host tests root it in a temp dir.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;

use log::{debug, warn};

use crate::app::ports::{FileStore, StorageError};

pub struct SdCard {
    root: PathBuf,
}

impl SdCard {
    /// `root` must already be mounted.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, name: &str) -> Result<PathBuf, StorageError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            warn!("SD: rejected file name {:?}", name);
            return Err(StorageError::NotFound);
        }
        Ok(self.root.join(name))
    }
}

fn map_io(e: &std::io::Error) -> StorageError {
    match e.kind() {
        ErrorKind::NotFound => StorageError::NotFound,
        ErrorKind::StorageFull => StorageError::Full,
        _ => StorageError::IoError,
    }
}

impl FileStore for SdCard {
    fn open_append(&self, name: &str) -> Result<Box<dyn Write + Send>, StorageError> {
        let path = self.path(name)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                warn!("SD: open {} failed: {}", path.display(), e);
                map_io(&e)
            })?;
        debug!("SD: appending to {}", path.display());
        Ok(Box::new(file))
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path(name)?;
        let mut file = File::open(&path).map_err(|e| map_io(&e))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| {
            warn!("SD: read {} failed: {}", path.display(), e);
            map_io(&e)
        })?;
        Ok(bytes)
    }

    fn size(&self, name: &str) -> Result<u64, StorageError> {
        let path = self.path(name)?;
        std::fs::metadata(&path).map(|m| m.len()).map_err(|e| map_io(&e))
    }

    fn truncate(&self, name: &str, len: u64) -> Result<(), StorageError> {
        let path = self.path(name)?;
        let file = OpenOptions::new().write(true).open(&path).map_err(|e| map_io(&e))?;
        file.set_len(len).map_err(|e| {
            warn!("SD: truncate {} failed: {}", path.display(), e);
            map_io(&e)
        })
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF mount
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use mount::{SdMount, mount};

#[cfg(target_os = "espidf")]
mod mount {
    use esp_idf_svc::fs::fatfs::Fatfs;
    use esp_idf_svc::hal::gpio::{AnyIOPin, InputPin, OutputPin};
    use esp_idf_svc::hal::peripheral::Peripheral;
    use esp_idf_svc::hal::spi::{self, Dma, SpiDriver, SpiDriverConfig};
    use esp_idf_svc::hal::sd::spi::SdSpiHostDriver;
    use esp_idf_svc::hal::sd::{SdCardConfiguration, SdCardDriver};
    use esp_idf_svc::io::vfs::MountedFatfs;
    use esp_idf_svc::sys::EspError;
    use log::info;

    /// Files that may be open at once on the card.
    const MAX_OPEN_FILES: usize = 5;
    const DMA_BUFFER: usize = 4096;

    type CardDriver = SdCardDriver<SdSpiHostDriver<'static, SpiDriver<'static>>>;

    /// Keeps the FAT volume mounted while alive.
    pub struct SdMount {
        _fatfs: MountedFatfs<Fatfs<CardDriver>>,
    }

    pub fn mount(
        spi: impl Peripheral<P = spi::SPI3> + 'static,
        sclk: impl Peripheral<P = impl OutputPin> + 'static,
        mosi: impl Peripheral<P = impl OutputPin> + 'static,
        miso: impl Peripheral<P = impl InputPin> + 'static,
        cs: impl Peripheral<P = impl OutputPin> + 'static,
        mount_point: &str,
    ) -> Result<SdMount, EspError> {
        let bus = SpiDriver::new(
            spi,
            sclk,
            mosi,
            Some(miso),
            &SpiDriverConfig::default().dma(Dma::Auto(DMA_BUFFER)),
        )?;
        let host = SdSpiHostDriver::new(
            bus,
            Some(cs),
            AnyIOPin::none(),
            AnyIOPin::none(),
            AnyIOPin::none(),
            None,
        )?;
        let card = SdCardDriver::new_spi(host, &SdCardConfiguration::new())?;
        let fatfs = MountedFatfs::mount(Fatfs::new_sdcard(0, card)?, mount_point, MAX_OPEN_FILES)?;
        info!("SD: card mounted at {}", mount_point);
        Ok(SdMount { _fatfs: fatfs })
    }
}

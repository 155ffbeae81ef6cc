
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use block_dev::BlockDevice;
use filesys::SECTOR_SIZE;

/// Super block, one bitmap sector and at least one data sector.
pub const MIN_SECTORS: u32 = 3;

/// A host file backing a block device, one sector per 512 bytes.
#[derive(Debug)]
pub struct BlockFile(pub Mutex<File>);

impl BlockFile {
    /// Create (or truncate) an image of `sectors` zeroed sectors.
    pub fn create(path: &Path, sectors: u32) -> io::Result<Self> {
        if sectors < MIN_SECTORS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("a volume needs at least {MIN_SECTORS} sectors, got {sectors}"),
            ));
        }

        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        fd.set_len(sectors as u64 * SECTOR_SIZE as u64)?;

        Ok(Self(Mutex::new(fd)))
    }

    pub fn open(path: &Path) -> io::Result<Self> {
        let fd = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self(Mutex::new(fd)))
    }

    /// Whole sectors the image holds.
    pub fn sectors(&self) -> io::Result<u64> {
        let len = self.0.lock().unwrap().metadata()?.len();
        Ok(len / SECTOR_SIZE as u64)
    }

    pub fn check_sector(&self, sector: u32) -> io::Result<()> {
        let sectors = self.sectors()?;
        if u64::from(sector) < sectors {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sector {sector} is past the end of the image ({sectors} sectors)"),
            ))
        }
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * SECTOR_SIZE) as u64))
            .expect("seeking error");
        file.read_exact(&mut buf[..SECTOR_SIZE])
            .expect("not a complete sector!");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * SECTOR_SIZE) as u64))
            .expect("seeking error");
        file.write_all(&buf[..SECTOR_SIZE])
            .expect("not a complete sector!");
    }

    fn handle_irq(&self) {}
}

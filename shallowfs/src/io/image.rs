use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::{BufWriter, ErrorKind, SeekFrom};
use std::path::Path;

use crate::io::block::{BlockNumber, BlockStorage};
use crate::BLOCK_SIZE;

/// A flat file acting as a virtual block device. Every filesystem structure
/// lives somewhere in this single image; reads and writes seek to the
/// requested block or byte offset with no buffering across calls.
pub struct DiskImage {
    /// The file should be a fixed-size file some exact multiple of the size
    /// of a block. Trailing bytes beyond the last whole block are ignored.
    fd: File,
    /// The total number of blocks addressable in the image.
    block_count: usize,
}

impl DiskImage {
    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }

    fn check_range(&self, blocknr: BlockNumber) -> std::io::Result<()> {
        if blocknr > self.block_count.saturating_sub(1) {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block out of range",
            ));
        }
        Ok(())
    }
}

impl BlockStorage for DiskImage {
    fn open_disk<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        // Return an error if the file does not exist rather than create one.
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let block_count = file.metadata()?.len() as usize / BLOCK_SIZE;

        Ok(DiskImage {
            fd: file,
            block_count,
        })
    }

    fn block_count(&self) -> usize {
        self.block_count
    }

    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()> {
        self.check_range(blocknr)?;

        if buf.len() < BLOCK_SIZE {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "buffer does not contain enough space to read block",
            ));
        }
        self.fd
            .seek(SeekFrom::Start((blocknr * BLOCK_SIZE) as u64))?;
        self.fd.read_exact(&mut buf[0..BLOCK_SIZE])?;
        Ok(())
    }

    /// This method truncates writes that exceed the total block size.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        self.check_range(blocknr)?;
        self.fd
            .seek(SeekFrom::Start((blocknr * BLOCK_SIZE) as u64))?;

        let max = if BLOCK_SIZE < buf.len() {
            BLOCK_SIZE
        } else {
            buf.len()
        };
        self.fd.write_all(&buf[0..max])?;
        Ok(())
    }

    fn read_record_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        if offset + buf.len() as u64 > (self.block_count * BLOCK_SIZE) as u64 {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "record out of range",
            ));
        }
        self.fd.seek(SeekFrom::Start(offset))?;
        self.fd.read_exact(buf)?;
        Ok(())
    }

    fn write_record_at(&mut self, offset: u64, buf: &[u8]) -> std::io::Result<()> {
        if offset + buf.len() as u64 > (self.block_count * BLOCK_SIZE) as u64 {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "record out of range",
            ));
        }
        self.fd.seek(SeekFrom::Start(offset))?;
        self.fd.write_all(buf)?;
        Ok(())
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        self.fd.sync_all()?;
        Ok(())
    }
}

pub struct DiskImageBuilder {
    fd: File,
    block_count: usize,
    clear: bool,
}

impl From<File> for DiskImageBuilder {
    fn from(fd: File) -> Self {
        DiskImageBuilder {
            fd,
            block_count: 0,
            clear: true,
        }
    }
}

impl DiskImageBuilder {
    /// Sets the number of desired blocks in the image.
    pub fn with_block_count(mut self, blocks: usize) -> Self {
        self.block_count = blocks;
        self
    }

    /// Controls whether the medium is zeroed on build. Pass `false` to open
    /// an already initialized image without destroying it.
    pub fn clear_medium(mut self, clear: bool) -> Self {
        self.clear = clear;
        self
    }

    /// This builder assumes ownership of the file descriptor used and does
    /// destructive things to prepare the file for use unless `clear_medium`
    /// was disabled. Ownership of the file is transferred to the image,
    /// meaning this builder can only be used to create one image.
    pub fn build(mut self) -> std::io::Result<DiskImage> {
        if self.clear {
            debug_assert!(self.block_count > 0);
            self.zero_medium()?;
        } else if self.block_count == 0 {
            self.block_count = self.fd.metadata()?.len() as usize / BLOCK_SIZE;
        }
        Ok(DiskImage {
            fd: self.fd,
            block_count: self.block_count,
        })
    }

    fn zero_medium(&mut self) -> std::io::Result<()> {
        let mut bfd = BufWriter::new(&self.fd);
        bfd.seek(SeekFrom::Start(0))?;
        // Zero out the "disk" blocks, buffering each write to prevent
        // excessive syscalls.
        for _ in 0..self.block_count {
            bfd.write_all(&[0x00; BLOCK_SIZE])?;
        }
        bfd.flush()?;
        Ok(())
    }
}

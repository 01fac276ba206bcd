use crate::fs::BLOCK_SIZE;
use crate::io::{BlockNumber, BlockStorage};
use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::{BufWriter, ErrorKind, SeekFrom};
use std::path::Path;

/// Emulates block disk/flash storage in userspace using a file as block storage.
/// Block `i` lives at byte offset `i * BLOCK_SIZE` of the file.
pub struct FileBlockEmulator {
    /// The file must be a fixed-size file some exact multiple of the size of a block.
    fd: File,
    /// The total number of blocks available in the file store.
    block_count: usize,
}

impl FileBlockEmulator {
    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }

    fn check_range(&self, blocknr: BlockNumber) -> std::io::Result<()> {
        if blocknr >= self.block_count {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block out of range",
            ));
        }
        Ok(())
    }
}

impl BlockStorage for FileBlockEmulator {
    fn open_disk<P: AsRef<Path>>(dest: P, nblocks: usize) -> std::io::Result<Self>
    where
        Self: std::marker::Sized,
    {
        if nblocks == 0 {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block device must have at least one block",
            ));
        }
        // Return error if the file does not exist rather than create one.
        let file = OpenOptions::new().read(true).write(true).open(dest)?;
        // A disk saved by an older run may be shorter than the requested geometry.
        let expected = (nblocks * BLOCK_SIZE) as u64;
        if file.metadata()?.len() < expected {
            file.set_len(expected)?;
        }

        Ok(FileBlockEmulator {
            fd: file,
            block_count: nblocks,
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
        self.fd.read_exact(&mut buf[..BLOCK_SIZE])
    }

    /// This method truncates writes that exceed the total block size.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        self.check_range(blocknr)?;
        self.fd
            .seek(SeekFrom::Start((blocknr * BLOCK_SIZE) as u64))?;

        let max = buf.len().min(BLOCK_SIZE);
        self.fd.write_all(&buf[0..max])
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        self.fd.sync_all()?;
        Ok(())
    }
}

pub struct FileBlockEmulatorBuilder {
    fd: File,
    block_count: usize,
    clear_medium: bool,
}

impl From<File> for FileBlockEmulatorBuilder {
    fn from(fd: File) -> Self {
        FileBlockEmulatorBuilder {
            fd,
            block_count: 0,
            clear_medium: true,
        }
    }
}

impl FileBlockEmulatorBuilder {
    /// Sets the number of desired blocks in the block store device.
    pub fn with_block_count(mut self, blocks: usize) -> Self {
        self.block_count = blocks;
        self
    }

    /// Whether `build` zero fills the whole medium. Defaults to true; disable it to
    /// reattach to a disk that already holds data.
    pub fn clear_medium(mut self, clear: bool) -> Self {
        self.clear_medium = clear;
        self
    }

    /// This builder assumes ownership of the file descriptor used and, unless told
    /// otherwise, does destructive things to prepare the file for use.
    pub fn build(mut self) -> std::io::Result<FileBlockEmulator> {
        if self.block_count == 0 {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block device must have at least one block",
            ));
        }
        let expected = (self.block_count * BLOCK_SIZE) as u64;
        if self.clear_medium {
            self.zero_blocks()?;
            self.fd.set_len(expected)?;
        } else if self.fd.metadata()?.len() < expected {
            self.fd.set_len(expected)?;
        }
        Ok(FileBlockEmulator {
            fd: self.fd,
            block_count: self.block_count,
        })
    }

    fn zero_blocks(&mut self) -> std::io::Result<()> {
        self.fd.seek(SeekFrom::Start(0))?;
        let zeroes = vec![0x00; BLOCK_SIZE];
        let mut bfd = BufWriter::new(&self.fd);
        // Buffer each block write to avoid one syscall per block.
        for _ in 0..self.block_count {
            bfd.write_all(&zeroes)?;
        }
        bfd.flush()
    }
}

use crate::alloc::{Bitmap, State};
use crate::error::{FsError, Result};
use crate::fs::BLOCK_SIZE;
use crate::image::{ImageReader, ImageWriter};
use crate::io::{BlockNumber, BlockStorage};
use log::{debug, warn};

/// Marks the end of the block dump in a persisted image. No device can have this
/// many blocks, so it never collides with a real block number.
pub const END_OF_BLOCKS: u64 = u64::MAX;

/// Fixed size block allocator over a `BlockStorage` device.
///
/// The store owns block lifetime: a block is either free or used, and only used
/// blocks have defined content.
pub struct BlockStore<T: BlockStorage> {
    dev: T,
    bitmap: Bitmap,
}

/// A decoded and validated block section of an image, not yet applied to a store.
#[derive(Debug)]
pub struct StoreSnapshot {
    bitmap: Bitmap,
    blocks: Vec<(BlockNumber, Vec<u8>)>,
}

impl StoreSnapshot {
    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    /// Marks a block free and drops its dumped content. Blocks that are out of
    /// range or already free are left alone.
    pub fn release(&mut self, blocknr: BlockNumber) -> Result<()> {
        if let Ok(State::Used) = self.bitmap.get(blocknr) {
            self.bitmap.set_free(blocknr)?;
            self.blocks.retain(|(b, _)| *b != blocknr);
        }
        Ok(())
    }
}

impl<T: BlockStorage> BlockStore<T> {
    /// Wraps a device with every block free.
    pub fn new(dev: T) -> Self {
        let bitmap = Bitmap::new(dev.block_count());
        Self { dev, bitmap }
    }

    pub fn block_count(&self) -> usize {
        self.bitmap.len()
    }

    pub fn free_blocks(&self) -> usize {
        self.bitmap.free_count()
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    pub fn is_free(&self, blocknr: BlockNumber) -> Result<bool> {
        Ok(self.bitmap.get(blocknr)? == State::Free)
    }

    pub fn into_device(self) -> T {
        self.dev
    }

    /// Reserves the lowest numbered free block.
    pub fn allocate(&mut self) -> Result<BlockNumber> {
        let blocknr = self
            .bitmap
            .next_available()
            .ok_or(FsError::CapacityExhausted)?;
        self.bitmap.set_reserved(blocknr)?;
        debug!("allocated block {}", blocknr);
        Ok(blocknr)
    }

    /// Stores `data` zero padded to a whole block and marks the block used.
    pub fn write(&mut self, blocknr: BlockNumber, data: &[u8]) -> Result<()> {
        if data.len() > BLOCK_SIZE {
            return Err(FsError::InvalidArgument(format!(
                "{} bytes do not fit in a {} byte block",
                data.len(),
                BLOCK_SIZE
            )));
        }
        if blocknr >= self.block_count() {
            return Err(FsError::OutOfRange(blocknr));
        }

        let mut padded = vec![0; BLOCK_SIZE];
        padded[..data.len()].copy_from_slice(data);
        self.dev.write_block(blocknr, &padded)?;
        self.bitmap.set_reserved(blocknr)
    }

    /// Returns the block content up to its last non zero byte. An all zero block
    /// reads back empty, so it cannot be told apart from a block holding zeros.
    pub fn read(&mut self, blocknr: BlockNumber) -> Result<Vec<u8>> {
        if self.bitmap.get(blocknr)? == State::Free {
            return Err(FsError::NotAllocated(blocknr));
        }

        let mut buf = vec![0; BLOCK_SIZE];
        self.dev.read_block(blocknr, &mut buf)?;
        let end = buf.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        buf.truncate(end);
        Ok(buf)
    }

    /// Zero fills the block on the device and releases it.
    pub fn free(&mut self, blocknr: BlockNumber) -> Result<()> {
        if self.bitmap.get(blocknr)? == State::Free {
            return Err(FsError::AlreadyFree(blocknr));
        }

        self.dev.write_block(blocknr, &vec![0; BLOCK_SIZE])?;
        self.bitmap.set_free(blocknr)?;
        debug!("freed block {}", blocknr);
        Ok(())
    }

    /// Releases a block without scrubbing its content. Used when rolling back or
    /// shrinking, where the data is about to be unreachable anyway.
    pub fn mark_free(&mut self, blocknr: BlockNumber) -> Result<()> {
        self.bitmap.set_free(blocknr)?;
        debug!("marked block {} free", blocknr);
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.dev.sync_disk()?;
        Ok(())
    }

    /// Appends the bitmap and a dump of every used block to `out`.
    ///
    /// # Layout
    /// ==============================================================================
    /// | bitmap len (u64) | bitmap (1 byte per block) | { index, len, payload }* | END |
    /// ==============================================================================
    pub fn persist(&mut self, out: &mut ImageWriter) -> Result<()> {
        out.put_len(self.bitmap.len());
        out.put_bytes(&self.bitmap.serialize());

        let used: Vec<BlockNumber> = self.bitmap.used().collect();
        for blocknr in used {
            let payload = self.read(blocknr)?;
            out.put_len(blocknr);
            out.put_len(payload.len());
            out.put_bytes(&payload);
        }
        out.put_u64(END_OF_BLOCKS);
        Ok(())
    }

    /// Reads a block section and loads it into this store.
    pub fn restore(&mut self, input: &mut ImageReader) -> Result<()> {
        let snapshot = self.decode(input)?;
        self.apply(snapshot)
    }

    /// Decodes a block section without touching the store. The bitmap must match
    /// the geometry of this device.
    pub fn decode(&self, input: &mut ImageReader) -> Result<StoreSnapshot> {
        let bitmap_len = input.length("bitmap length")?;
        if bitmap_len != self.block_count() {
            return Err(FsError::CorruptImage(format!(
                "image tracks {} blocks but the device has {}",
                bitmap_len,
                self.block_count()
            )));
        }
        let bitmap = Bitmap::parse(input.bytes(bitmap_len, "bitmap")?)?;

        let mut blocks = Vec::new();
        loop {
            let index = input.u64("block index")?;
            if index == END_OF_BLOCKS {
                break;
            }
            if index >= bitmap_len as u64 {
                return Err(FsError::CorruptImage(format!(
                    "block index {} outside a {} block device",
                    index, bitmap_len
                )));
            }
            let len = input.length("block payload length")?;
            if len > BLOCK_SIZE {
                return Err(FsError::CorruptImage(format!(
                    "block {} payload of {} bytes exceeds block size",
                    index, len
                )));
            }
            let payload = input.bytes(len, "block payload")?.to_vec();
            blocks.push((index as BlockNumber, payload));
        }

        Ok(StoreSnapshot { bitmap, blocks })
    }

    /// Replaces the bitmap and rewrites every dumped block onto the device. Used
    /// blocks missing from the dump are zero filled.
    pub fn apply(&mut self, snapshot: StoreSnapshot) -> Result<()> {
        let StoreSnapshot { bitmap, blocks } = snapshot;
        let mut written = vec![false; bitmap.len()];
        self.bitmap = bitmap;

        for (blocknr, payload) in blocks {
            if self.bitmap.get(blocknr)? == State::Free {
                warn!("image holds data for free block {}, marking it used", blocknr);
            }
            self.write(blocknr, &payload)?;
            written[blocknr] = true;
        }

        let missing: Vec<BlockNumber> = self.bitmap.used().filter(|b| !written[*b]).collect();
        for blocknr in missing {
            self.write(blocknr, &[])?;
        }
        Ok(())
    }
}

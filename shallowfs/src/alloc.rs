use std::io;
use std::io::ErrorKind;

use crate::io::BlockStorage;
use crate::BLOCK_SIZE;

/// Number of bytes needed to track one bit per block.
fn map_len(total_blocks: usize) -> usize {
    (total_blocks + 7) / 8
}

/// Number of whole blocks the map occupies at the image tail.
fn map_blocks(total_blocks: usize) -> usize {
    (map_len(total_blocks) + BLOCK_SIZE - 1) / BLOCK_SIZE
}

/// Free-space map for the whole image, one bit per block. The map itself is
/// persisted in the last `map_blocks` blocks of the image; those tail blocks
/// and block 0 (the root directory table) are never handed out by the
/// first-free search.
///
/// Bits are addressed at 32-bit word granularity, bit `i` living at
/// `words[i / 32]`, position `i % 32`, to match the reserved record layout.
pub(crate) struct Bitmap {
    words: Vec<u32>,
    total_blocks: usize,
    /// Upper bound (exclusive) for allocatable blocks; everything from here
    /// to `total_blocks` belongs to the map itself.
    data_blocks: usize,
}

impl Bitmap {
    /// A fresh map for an image of `total_blocks` with every block free.
    /// Fails if the image is too small to hold its own allocation map.
    pub fn empty(total_blocks: usize) -> io::Result<Self> {
        let (len, data_blocks) = Self::geometry(total_blocks)?;
        Ok(Self {
            words: vec![0; (len + 3) / 4],
            total_blocks,
            data_blocks,
        })
    }

    /// Reads the map from the image tail. The byte length and tail offset
    /// are both derived from the image size, so no cursor state is carried
    /// between callers.
    pub fn load<T: BlockStorage>(dev: &mut T) -> io::Result<Self> {
        let total_blocks = dev.block_count();
        let (len, data_blocks) = Self::geometry(total_blocks)?;

        let mut raw = vec![0u8; len];
        dev.read_record_at(Self::region_start(total_blocks), &mut raw)?;

        let mut words = vec![0u32; (len + 3) / 4];
        for (i, chunk) in raw.chunks(4).enumerate() {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            words[i] = u32::from_le_bytes(word);
        }

        Ok(Self {
            words,
            total_blocks,
            data_blocks,
        })
    }

    /// Writes the map back to the image tail, wholesale.
    pub fn save<T: BlockStorage>(&self, dev: &mut T) -> io::Result<()> {
        let len = map_len(self.total_blocks);
        let mut raw = Vec::with_capacity(self.words.len() * 4);
        for word in &self.words {
            raw.extend_from_slice(&word.to_le_bytes());
        }
        raw.truncate(len);
        dev.write_record_at(Self::region_start(self.total_blocks), &raw)
    }

    pub fn test(&self, blocknr: usize) -> bool {
        assert!(blocknr < self.total_blocks);
        self.words[blocknr / 32] & (1 << (blocknr % 32)) != 0
    }

    pub fn set(&mut self, blocknr: usize) {
        assert!(blocknr < self.total_blocks);
        self.words[blocknr / 32] |= 1 << (blocknr % 32);
    }

    /// Marks a block free again. No handler reclaims blocks today (rmdir
    /// leaves the removed directory's block marked), so this only sees use
    /// from tests.
    #[allow(dead_code)]
    pub fn clear(&mut self, blocknr: usize) {
        assert!(blocknr < self.total_blocks);
        self.words[blocknr / 32] &= !(1 << (blocknr % 32));
    }

    /// Linear upward scan for the first unset bit, beginning at `start`.
    /// Block 0 holds the root directory table and is never returned; the
    /// scan also stops short of the map's own tail blocks.
    pub fn find_first_free(&self, start: usize) -> Option<usize> {
        let start = start.max(1);
        (start..self.data_blocks).find(|&blocknr| !self.test(blocknr))
    }

    pub fn data_blocks(&self) -> usize {
        self.data_blocks
    }

    fn geometry(total_blocks: usize) -> io::Result<(usize, usize)> {
        let reserved = map_blocks(total_blocks);
        if total_blocks == 0 || reserved >= total_blocks {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                "image too small to hold an allocation map",
            ));
        }
        Ok((map_len(total_blocks), total_blocks - reserved))
    }

    /// Byte offset of the map: the first block after the last data block.
    fn region_start(total_blocks: usize) -> u64 {
        ((total_blocks - map_blocks(total_blocks)) * BLOCK_SIZE) as u64
    }
}

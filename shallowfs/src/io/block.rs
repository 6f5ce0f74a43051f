use std::path::Path;

/// The block number to access ranging from 0 (the first block) to n - 1 (the
/// last block) where n is number of blocks available.
pub type BlockNumber = usize;

/// Access to the flat image file backing the filesystem. Implementations do
/// no caching of their own; a handler reads what it needs, mutates a private
/// copy, and writes it back within a single call.
pub trait BlockStorage {
    /// Opens an existing image at the specified path. The number of
    /// addressable blocks is derived from the file length, rounded down to a
    /// block boundary. This method does not validate the image contents; it
    /// is up to clients to ensure the medium was appropriately initialized.
    fn open_disk<P: AsRef<Path>>(path: P) -> std::io::Result<Self>
    where
        Self: std::marker::Sized;

    /// The total number of addressable blocks in the image.
    fn block_count(&self) -> usize;

    /// Reads disk block number into the provided buffer.
    ///
    /// # Errors
    ///
    /// Attempting to read a block out of range, or into a buffer smaller
    /// than one block, will return an error.
    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()>;

    /// Writes the provided buffer into the specified block number. Writes
    /// beyond one block are truncated to the block size.
    ///
    /// # Errors
    ///
    /// Attempting to write a block out of range will return an error.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()>;

    /// Reads a record of exactly `buf.len()` bytes starting at an arbitrary
    /// byte offset. Used for structures that are not block aligned, such as
    /// the allocation map in the image tail.
    fn read_record_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<()>;

    /// Writes a record at an arbitrary byte offset.
    fn write_record_at(&mut self, offset: u64, buf: &[u8]) -> std::io::Result<()>;

    /// Flush any buffered disk IO from memory. This is useful if it must be
    /// guaranteed the disk writes actually occurred, for instance, if being
    /// re-read from disk.
    fn sync_disk(&mut self) -> std::io::Result<()>;
}

//! On-disk directory records.
//!
//! Block 0 holds the root directory table: an `i32` count followed by a
//! packed array of `{name[9], start_block: i64}` entries. Each created
//! directory owns one block holding an `i32` count followed by a packed
//! array of `{name[9], ext[4], size: u64, start_block: i64}` entries. All
//! integers are little-endian, names are NUL-padded, and both records are
//! zero-padded to exactly one block. The capacities below fall out of
//! fitting each record into a single 512 byte block.

use std::convert::TryInto;
use std::io;
use std::io::ErrorKind;

use crate::fs::FsError;
use crate::BLOCK_SIZE;

/// 8.3 naming: up to eight name bytes and three extension bytes.
pub const MAX_FILENAME: usize = 8;
pub const MAX_EXTENSION: usize = 3;

const COUNT_FIELD: usize = 4;
/// name (plus NUL) and a start block pointer.
const DIR_ENTRY_SIZE: usize = (MAX_FILENAME + 1) + 8;
/// name and extension (each plus NUL), a size, and a start block pointer.
const FILE_ENTRY_SIZE: usize = (MAX_FILENAME + 1) + (MAX_EXTENSION + 1) + 8 + 8;

/// How many subdirectories fit in the root table. 29 for 512 byte blocks.
pub const MAX_DIRS_IN_ROOT: usize = (BLOCK_SIZE - COUNT_FIELD) / DIR_ENTRY_SIZE;
/// How many files fit in one directory block. 17 for 512 byte blocks.
pub const MAX_FILES_IN_DIR: usize = (BLOCK_SIZE - COUNT_FIELD) / FILE_ENTRY_SIZE;

#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub name: String,
    /// Block index of this directory's file table.
    pub start_block: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub name: String,
    pub ext: String,
    pub size: u64,
    /// Reserved pointer to the first content block. Content storage is not
    /// implemented; the block is allocated so the entry owns it.
    pub start_block: u64,
}

/// The block 0 record listing every top-level directory.
#[derive(Debug, PartialEq)]
pub struct RootDirectory {
    entries: Vec<DirEntry>,
}

impl RootDirectory {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Reads the root table from a buffer of exactly one block. Passing a
    /// slice of any other size will result in a panic.
    pub fn parse(buf: &[u8]) -> io::Result<Self> {
        assert_eq!(
            buf.len(),
            BLOCK_SIZE,
            "length of buffer to parse must equal block size"
        );
        let count = i32::from_le_bytes(buf[0..4].try_into().unwrap());
        if count < 0 || count as usize > MAX_DIRS_IN_ROOT {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                "root directory count out of range",
            ));
        }

        let mut entries = Vec::with_capacity(count as usize);
        let mut offset = COUNT_FIELD;
        for _ in 0..count {
            let name = read_name(&buf[offset..offset + MAX_FILENAME + 1]);
            let start_block =
                u64::from_le_bytes(buf[offset + 9..offset + 17].try_into().unwrap());
            entries.push(DirEntry { name, start_block });
            offset += DIR_ENTRY_SIZE;
        }
        Ok(Self { entries })
    }

    /// Serializes the table into one block for writing to disk.
    pub fn serialize(&self) -> [u8; BLOCK_SIZE] {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[0..4].copy_from_slice(&(self.entries.len() as i32).to_le_bytes());

        let mut offset = COUNT_FIELD;
        for entry in &self.entries {
            write_name(&mut buf[offset..offset + MAX_FILENAME + 1], &entry.name);
            buf[offset + 9..offset + 17].copy_from_slice(&entry.start_block.to_le_bytes());
            offset += DIR_ENTRY_SIZE;
        }
        buf
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    /// Case-sensitive exact-match scan.
    pub fn find(&self, name: &str) -> Option<&DirEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn insert(&mut self, name: &str, start_block: u64) -> Result<(), FsError> {
        if name.len() > MAX_FILENAME {
            return Err(FsError::NameTooLong);
        }
        if self.entries.len() >= MAX_DIRS_IN_ROOT {
            return Err(FsError::NoSpace);
        }
        if self.find(name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        self.entries.push(DirEntry {
            name: name.to_string(),
            start_block,
        });
        Ok(())
    }

    /// Removes an entry, replacing it with the last one so the array stays
    /// packed on disk.
    pub fn remove(&mut self, name: &str) -> Result<DirEntry, FsError> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.name == name)
            .ok_or(FsError::NotFound)?;
        Ok(self.entries.swap_remove(index))
    }
}

/// The per-directory record listing its files.
#[derive(Debug, PartialEq)]
pub struct DirectoryBlock {
    files: Vec<FileEntry>,
}

impl DirectoryBlock {
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    /// Reads a directory record from a buffer of exactly one block. Passing
    /// a slice of any other size will result in a panic.
    pub fn parse(buf: &[u8]) -> io::Result<Self> {
        assert_eq!(
            buf.len(),
            BLOCK_SIZE,
            "length of buffer to parse must equal block size"
        );
        let count = i32::from_le_bytes(buf[0..4].try_into().unwrap());
        if count < 0 || count as usize > MAX_FILES_IN_DIR {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                "directory file count out of range",
            ));
        }

        let mut files = Vec::with_capacity(count as usize);
        let mut offset = COUNT_FIELD;
        for _ in 0..count {
            let name = read_name(&buf[offset..offset + MAX_FILENAME + 1]);
            let ext = read_name(&buf[offset + 9..offset + 9 + MAX_EXTENSION + 1]);
            let size = u64::from_le_bytes(buf[offset + 13..offset + 21].try_into().unwrap());
            let start_block =
                u64::from_le_bytes(buf[offset + 21..offset + 29].try_into().unwrap());
            files.push(FileEntry {
                name,
                ext,
                size,
                start_block,
            });
            offset += FILE_ENTRY_SIZE;
        }
        Ok(Self { files })
    }

    pub fn serialize(&self) -> [u8; BLOCK_SIZE] {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[0..4].copy_from_slice(&(self.files.len() as i32).to_le_bytes());

        let mut offset = COUNT_FIELD;
        for file in &self.files {
            write_name(&mut buf[offset..offset + MAX_FILENAME + 1], &file.name);
            write_name(
                &mut buf[offset + 9..offset + 9 + MAX_EXTENSION + 1],
                &file.ext,
            );
            buf[offset + 13..offset + 21].copy_from_slice(&file.size.to_le_bytes());
            buf[offset + 21..offset + 29].copy_from_slice(&file.start_block.to_le_bytes());
            offset += FILE_ENTRY_SIZE;
        }
        buf
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// A file matches only when both name and extension are equal.
    pub fn find(&self, name: &str, ext: &str) -> Option<&FileEntry> {
        self.files
            .iter()
            .find(|file| file.name == name && file.ext == ext)
    }

    pub fn insert(&mut self, name: &str, ext: &str, start_block: u64) -> Result<(), FsError> {
        if name.len() > MAX_FILENAME || ext.len() > MAX_EXTENSION {
            return Err(FsError::NameTooLong);
        }
        if self.files.len() >= MAX_FILES_IN_DIR {
            return Err(FsError::NoSpace);
        }
        if self.find(name, ext).is_some() {
            return Err(FsError::AlreadyExists);
        }
        self.files.push(FileEntry {
            name: name.to_string(),
            ext: ext.to_string(),
            size: 0,
            start_block,
        });
        Ok(())
    }
}

/// Names are stored NUL-padded in a fixed field one byte longer than the
/// maximum name.
fn read_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn write_name(field: &mut [u8], name: &str) {
    let bytes = name.as_bytes();
    field[..bytes.len()].copy_from_slice(bytes);
}

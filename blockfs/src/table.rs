use crate::error::{FsError, Result};
use crate::io::BlockNumber;
use crate::path::{self, ROOT};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn to_byte(self) -> u8 {
        match self {
            EntryKind::File => 0,
            EntryKind::Directory => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(EntryKind::File),
            1 => Some(EntryKind::Directory),
            _ => None,
        }
    }
}

/// Metadata for one file or directory. Entries only hold block numbers; content
/// always goes through the block store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Canonical absolute path, unique across the table.
    pub path: String,
    pub kind: EntryKind,
    /// Logical length in bytes, always 0 for directories.
    pub size: usize,
    /// Blocks holding the file bytes in order. Empty for directories.
    pub blocks: Vec<BlockNumber>,
}

impl Entry {
    pub fn file(path: String, size: usize, blocks: Vec<BlockNumber>) -> Self {
        Self {
            path,
            kind: EntryKind::File,
            size,
            blocks,
        }
    }

    pub fn directory(path: String) -> Self {
        Self {
            path,
            kind: EntryKind::Directory,
            size: 0,
            blocks: Vec::new(),
        }
    }

    pub fn root() -> Self {
        Self::directory(ROOT.to_string())
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Path keyed entries. Hierarchy is not stored; a parent's children are the
/// entries whose path extends the parent's path by at least one component.
#[derive(Debug, Default, Clone)]
pub struct FileTable {
    entries: HashMap<String, Entry>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: Entry) -> Result<()> {
        if self.entries.contains_key(&entry.path) {
            return Err(FsError::AlreadyExists(entry.path));
        }
        self.entries.insert(entry.path.clone(), entry);
        Ok(())
    }

    pub fn remove(&mut self, path: &str) -> Option<Entry> {
        self.entries.remove(path)
    }

    /// Exact key lookup. The path must already be canonical.
    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Entry)> {
        self.entries.iter()
    }

    /// Paths of every entry strictly below `dir`.
    pub fn descendants(&self, dir: &str) -> Vec<String> {
        self.entries
            .keys()
            .filter(|p| path::is_descendant(p, dir))
            .cloned()
            .collect()
    }

    /// Names of the entries directly below `dir`, sorted and without duplicates.
    /// Deeper entries contribute their first component below `dir`.
    pub fn children(&self, dir: &str) -> Vec<String> {
        let prefix = path::child_prefix(dir);
        let mut names: Vec<String> = self
            .entries
            .keys()
            .filter(|p| path::is_descendant(p, dir))
            .filter_map(|p| p[prefix.len()..].split('/').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

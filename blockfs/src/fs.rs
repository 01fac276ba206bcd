use crate::alloc::State;
use crate::error::{FsError, Result};
use crate::image::{ImageReader, ImageWriter};
use crate::io::{BlockNumber, BlockStorage};
use crate::path::{self, ROOT};
use crate::store::{BlockStore, StoreSnapshot};
use crate::table::{Entry, EntryKind, FileTable};
use log::{debug, info, warn};
use std::collections::HashSet;

pub const BLOCK_SIZE: usize = 4096;
/// Upper bound on the blocks a single file may own, independent of device size.
pub const MAX_BLOCKS: usize = 256;
pub const MAX_FILE_SIZE: usize = MAX_BLOCKS * BLOCK_SIZE;

fn blocks_for(size: usize) -> usize {
    size.div_ceil(BLOCK_SIZE)
}

/// A hierarchical file system kept as a flat path keyed table on top of a block
/// store. The table and the store bitmap are kept consistent by every operation:
/// each block an entry references is used, and no two entries share a block.
pub struct FileSystem<T: BlockStorage> {
    store: BlockStore<T>,
    table: FileTable,
}

impl<T: BlockStorage> FileSystem<T> {
    /// Creates an empty file system holding only the root directory. The device
    /// content is not inspected; use `load` to bring back a saved image.
    pub fn new(dev: T) -> Self {
        let mut fs = FileSystem {
            store: BlockStore::new(dev),
            table: FileTable::new(),
        };
        fs.initialize_file_system();
        fs
    }

    /// Ensures `/` exists as a directory. Safe to call any number of times.
    pub fn initialize_file_system(&mut self) {
        match self.table.get(ROOT) {
            Some(root) if root.is_dir() => {}
            Some(_) => {
                warn!("root entry is not a directory, replacing it");
                self.table.remove(ROOT);
                self.insert_root();
            }
            None => self.insert_root(),
        }
    }

    fn insert_root(&mut self) {
        // Only reached once the root key is known to be absent.
        if let Err(err) = self.table.insert(Entry::root()) {
            warn!("could not create root directory: {}", err);
        }
    }

    pub fn store(&self) -> &BlockStore<T> {
        &self.store
    }

    pub fn table(&self) -> &FileTable {
        &self.table
    }

    pub fn into_store(self) -> BlockStore<T> {
        self.store
    }

    /// Looks up a path after resolving it.
    pub fn get_metadata(&self, path: &str) -> Option<&Entry> {
        self.table.get(&path::resolve(path))
    }

    fn entry(&self, resolved: &str) -> Result<&Entry> {
        self.table
            .get(resolved)
            .ok_or_else(|| FsError::NotFound(resolved.to_string()))
    }

    fn file_entry(&self, resolved: &str) -> Result<&Entry> {
        let entry = self.entry(resolved)?;
        if !entry.is_file() {
            return Err(FsError::NotAFile(resolved.to_string()));
        }
        Ok(entry)
    }

    fn dir_entry(&self, resolved: &str) -> Result<&Entry> {
        let entry = self.entry(resolved)?;
        if !entry.is_dir() {
            return Err(FsError::NotADirectory(resolved.to_string()));
        }
        Ok(entry)
    }

    /// Creates every missing ancestor directory of `resolved`, outermost first.
    fn ensure_parent_directories(&mut self, resolved: &str) -> Result<()> {
        for ancestor in path::ancestors(resolved) {
            match self.table.get(&ancestor) {
                Some(entry) if entry.is_dir() => {}
                Some(_) => return Err(FsError::PathConflict(ancestor)),
                None => {
                    info!("creating missing parent directory {}", ancestor);
                    self.table.insert(Entry::directory(ancestor))?;
                }
            }
        }
        Ok(())
    }

    /// Creates a file of `size` bytes, reserving `ceil(size / BLOCK_SIZE)` zeroed
    /// blocks. Missing parent directories are created along the way.
    pub fn create_file(&mut self, path: &str, size: usize) -> Result<()> {
        path::validate_name(path)?;
        let resolved = path::resolve(path);
        self.ensure_parent_directories(&resolved)?;
        if self.table.contains(&resolved) {
            return Err(FsError::AlreadyExists(resolved));
        }
        if size > MAX_FILE_SIZE {
            return Err(FsError::CapacityExceeded {
                size,
                limit: MAX_FILE_SIZE,
            });
        }

        let mut blocks = Vec::with_capacity(blocks_for(size));
        if let Err(err) = self.reserve_zeroed(blocks_for(size), &mut blocks) {
            self.rollback(&blocks);
            return Err(err);
        }

        info!(
            "created file {} ({} bytes, {} blocks)",
            resolved,
            size,
            blocks.len()
        );
        self.table.insert(Entry::file(resolved, size, blocks))
    }

    fn reserve_zeroed(&mut self, count: usize, blocks: &mut Vec<BlockNumber>) -> Result<()> {
        for _ in 0..count {
            blocks.push(self.store.allocate()?);
        }
        // A reused block may still carry bytes from a shrunk file.
        for &blocknr in blocks.iter() {
            self.store.write(blocknr, &[])?;
        }
        Ok(())
    }

    /// Releases blocks reserved by an operation that failed part way.
    fn rollback(&mut self, blocks: &[BlockNumber]) {
        for &blocknr in blocks {
            if let Err(err) = self.store.mark_free(blocknr) {
                warn!("failed to roll back block {}: {}", blocknr, err);
            }
        }
        if !blocks.is_empty() {
            debug!("rolled back {} blocks", blocks.len());
        }
    }

    pub fn create_directory(&mut self, path: &str) -> Result<()> {
        path::validate_name(path)?;
        let resolved = path::resolve(path);
        self.ensure_parent_directories(&resolved)?;
        if self.table.contains(&resolved) {
            return Err(FsError::AlreadyExists(resolved));
        }

        info!("created directory {}", resolved);
        self.table.insert(Entry::directory(resolved))
    }

    /// Frees and scrubs every block of the file, then drops its entry. Blocks freed
    /// before a failure stay freed.
    pub fn delete_file(&mut self, path: &str) -> Result<()> {
        let resolved = path::resolve(path);
        let blocks = self.file_entry(&resolved)?.blocks.clone();

        for blocknr in blocks {
            self.store.free(blocknr)?;
        }
        self.table.remove(&resolved);
        info!("deleted file {}", resolved);
        Ok(())
    }

    /// Deletes a directory. Without `recursive` the directory must be empty; the
    /// check runs before anything is modified. The root can never be deleted.
    pub fn delete_directory(&mut self, path: &str, recursive: bool) -> Result<()> {
        let resolved = path::resolve(path);
        if resolved == ROOT {
            return Err(FsError::RootDeletionForbidden);
        }
        self.dir_entry(&resolved)?;

        let children = self.table.children(&resolved);
        if !children.is_empty() {
            if !recursive {
                return Err(FsError::DirectoryNotEmpty(resolved));
            }
            for name in children {
                let child = path::join(&resolved, &name);
                match self.table.get(&child).map(|e| e.kind) {
                    Some(EntryKind::File) => self.delete_file(&child)?,
                    Some(EntryKind::Directory) => self.delete_directory(&child, true)?,
                    // An intermediate path with no entry of its own; clear what sits below it.
                    None => self.delete_orphans(&child)?,
                }
            }
        }

        self.table.remove(&resolved);
        info!("deleted directory {}", resolved);
        Ok(())
    }

    fn delete_orphans(&mut self, dir: &str) -> Result<()> {
        for descendant in self.table.descendants(dir) {
            match self.table.get(&descendant).map(|e| e.kind) {
                Some(EntryKind::File) => self.delete_file(&descendant)?,
                Some(EntryKind::Directory) => {
                    self.table.remove(&descendant);
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Names of the immediate children of a directory, sorted. Files and
    /// directories are listed alike.
    pub fn list_directory(&self, path: &str) -> Result<Vec<String>> {
        let resolved = path::resolve(path);
        self.dir_entry(&resolved)?;
        Ok(self.table.children(&resolved))
    }

    /// Replaces or extends the content of a file, growing or shrinking its block
    /// list to fit. Blocks allocated by a failed write are released again and the
    /// entry is left unchanged.
    pub fn write_file(&mut self, path: &str, data: &[u8], append: bool) -> Result<()> {
        let resolved = path::resolve(path);
        let entry = self.file_entry(&resolved)?.clone();

        let content = if append {
            let mut existing = self.read_entry(&entry)?;
            existing.extend_from_slice(data);
            existing
        } else {
            data.to_vec()
        };
        if content.len() > MAX_FILE_SIZE {
            return Err(FsError::CapacityExceeded {
                size: content.len(),
                limit: MAX_FILE_SIZE,
            });
        }

        let required = blocks_for(content.len());
        let mut fresh = Vec::new();
        let blocks = match self.place_content(&entry, &content, required, &mut fresh) {
            Ok(blocks) => blocks,
            Err(err) => {
                self.rollback(&fresh);
                return Err(err);
            }
        };

        // Shrinking: blocks past the new end are unreachable now.
        for &blocknr in entry.blocks.iter().skip(required) {
            self.store.mark_free(blocknr)?;
        }

        debug!(
            "wrote {} bytes to {} across {} blocks",
            content.len(),
            resolved,
            blocks.len()
        );
        let updated = Entry {
            size: content.len(),
            blocks,
            ..entry
        };
        self.table.remove(&resolved);
        self.table.insert(updated)
    }

    /// Picks a block for every chunk of `content`, reusing the entry's blocks in
    /// order and allocating the rest, then writes the chunks out. Newly allocated
    /// blocks are recorded in `fresh` as they are taken.
    fn place_content(
        &mut self,
        entry: &Entry,
        content: &[u8],
        required: usize,
        fresh: &mut Vec<BlockNumber>,
    ) -> Result<Vec<BlockNumber>> {
        let mut blocks = Vec::with_capacity(required);
        for i in 0..required {
            match entry.blocks.get(i) {
                Some(&blocknr) => blocks.push(blocknr),
                None => {
                    let blocknr = self.store.allocate()?;
                    fresh.push(blocknr);
                    blocks.push(blocknr);
                }
            }
        }

        for (chunk, &blocknr) in content.chunks(BLOCK_SIZE).zip(blocks.iter()) {
            self.store.write(blocknr, chunk)?;
        }
        Ok(blocks)
    }

    /// Returns exactly `size` bytes of the file.
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let resolved = path::resolve(path);
        let entry = self.file_entry(&resolved)?.clone();
        self.read_entry(&entry)
    }

    /// Blocks come back with trailing zeros trimmed. Each one is padded back to a
    /// full block before the result is cut to the logical size, so zero bytes
    /// inside the file survive.
    fn read_entry(&mut self, entry: &Entry) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(entry.blocks.len() * BLOCK_SIZE);
        for &blocknr in &entry.blocks {
            let mut block = self.store.read(blocknr)?;
            block.resize(BLOCK_SIZE, 0);
            data.extend_from_slice(&block);
        }
        data.resize(entry.size, 0);
        Ok(data)
    }

    /// Moves a file by copying its content to a new entry and deleting the source.
    /// The destination's parent directory must already exist.
    pub fn move_file(&mut self, src: &str, dst: &str) -> Result<()> {
        let src_resolved = path::resolve(src);
        let dst_resolved = path::resolve(dst);
        if src_resolved == dst_resolved {
            return Err(FsError::InvalidArgument(format!(
                "source and destination are the same: {}",
                src_resolved
            )));
        }

        let size = self.file_entry(&src_resolved)?.size;
        let parent = path::parent(&dst_resolved).to_string();
        if !self.table.contains(&parent) {
            return Err(FsError::NotFound(parent));
        }

        let content = self.read_file(&src_resolved)?;
        self.create_file(dst, size)?;
        self.write_file(&dst_resolved, &content, false)?;
        self.delete_file(&src_resolved)?;
        info!("moved file {} to {}", src_resolved, dst_resolved);
        Ok(())
    }

    /// Moves a directory tree entry by entry. A failure part way leaves the tree
    /// split between source and destination.
    pub fn move_directory(&mut self, src: &str, dst: &str) -> Result<()> {
        path::validate_name(dst)?;
        let src_resolved = path::resolve(src);
        let dst_resolved = path::resolve(dst);
        if src_resolved == dst_resolved {
            return Err(FsError::InvalidArgument(format!(
                "source and destination are the same: {}",
                src_resolved
            )));
        }
        if path::is_descendant(&dst_resolved, &src_resolved) {
            return Err(FsError::InvalidArgument(format!(
                "cannot move {} into itself",
                src_resolved
            )));
        }
        self.dir_entry(&src_resolved)?;
        if self.table.contains(&dst_resolved) {
            return Err(FsError::AlreadyExists(dst_resolved));
        }
        let parent = path::parent(&dst_resolved).to_string();
        self.dir_entry(&parent)?;

        self.table.insert(Entry::directory(dst_resolved.clone()))?;
        for name in self.table.children(&src_resolved) {
            let from = path::join(&src_resolved, &name);
            let to = path::join(&dst_resolved, &name);
            match self.table.get(&from).map(|e| e.kind) {
                Some(EntryKind::File) => self.move_file(&from, &to)?,
                Some(EntryKind::Directory) => self.move_directory(&from, &to)?,
                // An intermediate path with no entry of its own.
                None => {
                    self.table.insert(Entry::directory(from.clone()))?;
                    self.move_directory(&from, &to)?;
                }
            }
        }
        self.delete_directory(&src_resolved, false)?;
        info!("moved directory {} to {}", src_resolved, dst_resolved);
        Ok(())
    }

    /// Renames an entry within its parent directory. Block ownership is kept as
    /// is; nothing in the block store changes. Renaming a directory re-keys the
    /// entries below it as well.
    pub fn rename_path(&mut self, src: &str, new_name: &str) -> Result<()> {
        if new_name.contains('/') || new_name == "." || new_name == ".." {
            return Err(FsError::InvalidName(new_name.to_string()));
        }
        path::validate_name(new_name)?;

        let src_resolved = path::resolve(src);
        if src_resolved == ROOT {
            return Err(FsError::InvalidArgument(
                "the root directory cannot be renamed".to_string(),
            ));
        }
        self.entry(&src_resolved)?;
        let dst_resolved = path::join(path::parent(&src_resolved), new_name);
        if self.table.contains(&dst_resolved) {
            return Err(FsError::AlreadyExists(dst_resolved));
        }

        let mut moved = vec![src_resolved.clone()];
        moved.extend(self.table.descendants(&src_resolved));
        let entries: Vec<Entry> = moved
            .iter()
            .filter_map(|p| self.table.remove(p))
            .collect();
        for mut entry in entries {
            entry.path = format!("{}{}", dst_resolved, &entry.path[src_resolved.len()..]);
            self.table.insert(entry)?;
        }
        info!("renamed {} to {}", src_resolved, dst_resolved);
        Ok(())
    }

    /// Serializes the file table followed by the block store.
    ///
    /// # Layout
    /// ==============================================================================
    /// | count (u64) | { path len, path, kind (u8), size, block count, blocks }* | store |
    /// ==============================================================================
    pub fn save(&mut self) -> Result<Vec<u8>> {
        self.store.sync()?;
        let mut out = ImageWriter::new();
        out.put_len(self.table.len());
        for (path, entry) in self.table.iter() {
            out.put_len(path.len());
            out.put_bytes(path.as_bytes());
            out.put_u8(entry.kind.to_byte());
            out.put_len(entry.size);
            out.put_len(entry.blocks.len());
            for &blocknr in &entry.blocks {
                out.put_len(blocknr);
            }
        }
        self.store.persist(&mut out)?;

        let image = out.into_inner();
        info!(
            "saved {} entries in a {} byte image",
            self.table.len(),
            image.len()
        );
        Ok(image)
    }

    /// Replaces the whole file system state with a saved image. The image is
    /// decoded and checked in full before anything is applied.
    pub fn load(&mut self, image: &[u8]) -> Result<()> {
        let mut input = ImageReader::new(image);
        let mut table = Self::decode_table(&mut input)?;
        let mut snapshot = self.store.decode(&mut input)?;

        let root_ok = table.get(ROOT).map_or(false, |root| root.is_dir());
        if !root_ok {
            warn!("image has no valid root directory, creating a fresh one");
            // A file sitting at the root takes its blocks with it.
            if let Some(displaced) = table.remove(ROOT) {
                for blocknr in displaced.blocks {
                    snapshot.release(blocknr)?;
                }
            }
            table.insert(Entry::root())?;
        }

        if input.remaining() > 0 {
            warn!(
                "ignoring {} trailing bytes after the image",
                input.remaining()
            );
        }
        Self::check_consistency(&table, &snapshot)?;

        self.store.apply(snapshot)?;
        self.table = table;
        info!("loaded {} entries", self.table.len());
        Ok(())
    }

    fn decode_table(input: &mut ImageReader) -> Result<FileTable> {
        let count = input.u64("entry count")?;
        let mut table = FileTable::new();
        for _ in 0..count {
            let path_len = input.length("path length")?;
            let raw = input.bytes(path_len, "path")?;
            let path = String::from_utf8(raw.to_vec())
                .map_err(|_| FsError::CorruptImage("path is not valid UTF-8".to_string()))?;
            let kind_byte = input.u8("entry kind")?;
            let kind = EntryKind::from_byte(kind_byte).ok_or_else(|| {
                FsError::CorruptImage(format!("unknown kind {} for {}", kind_byte, path))
            })?;
            let size = input.length("entry size")?;
            let block_count = input.length("block count")?;
            let mut blocks = Vec::new();
            for _ in 0..block_count {
                blocks.push(input.length("block index")?);
            }

            let entry = Entry {
                path,
                kind,
                size,
                blocks,
            };
            table.insert(entry).map_err(|err| match err {
                FsError::AlreadyExists(p) => {
                    FsError::CorruptImage(format!("duplicate entry {}", p))
                }
                other => other,
            })?;
        }
        Ok(table)
    }

    /// Every referenced block must be in range, used, and owned by one entry only.
    fn check_consistency(table: &FileTable, snapshot: &StoreSnapshot) -> Result<()> {
        let bitmap = snapshot.bitmap();
        let mut owned = HashSet::new();
        for (path, entry) in table.iter() {
            if entry.is_dir() && !entry.blocks.is_empty() {
                return Err(FsError::CorruptImage(format!(
                    "directory {} owns blocks",
                    path
                )));
            }
            if entry.size > entry.blocks.len() * BLOCK_SIZE {
                return Err(FsError::CorruptImage(format!(
                    "{} is {} bytes but owns {} blocks",
                    path,
                    entry.size,
                    entry.blocks.len()
                )));
            }
            for &blocknr in &entry.blocks {
                match bitmap.get(blocknr) {
                    Ok(State::Used) => {}
                    _ => {
                        return Err(FsError::CorruptImage(format!(
                            "{} references unallocated block {}",
                            path, blocknr
                        )))
                    }
                }
                if !owned.insert(blocknr) {
                    return Err(FsError::CorruptImage(format!(
                        "block {} is shared by more than one entry",
                        blocknr
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{FileBlockEmulator, FileBlockEmulatorBuilder};

    fn create_test_device(blocks: usize) -> FileBlockEmulator {
        let dev = tempfile::tempfile().unwrap();
        FileBlockEmulatorBuilder::from(dev)
            .with_block_count(blocks)
            .build()
            .expect("Could not initialize disk emulator.")
    }

    fn create_test_fs(blocks: usize) -> FileSystem<FileBlockEmulator> {
        FileSystem::new(create_test_device(blocks))
    }

    #[test]
    fn new_file_system_has_only_root() {
        let fs = create_test_fs(8);
        assert_eq!(fs.table().len(), 1);
        assert!(fs.get_metadata("/").unwrap().is_dir());
        assert!(fs.list_directory("/").unwrap().is_empty());
    }

    #[test]
    fn initialize_is_idempotent() {
        let mut fs = create_test_fs(8);
        fs.create_directory("/keep").unwrap();
        fs.initialize_file_system();
        fs.initialize_file_system();
        assert_eq!(fs.table().len(), 2);
    }

    #[test]
    fn create_file_rejects_invalid_names() {
        let mut fs = create_test_fs(8);
        assert!(matches!(
            fs.create_file("/bad name", 10),
            Err(FsError::InvalidName(_))
        ));
        assert!(matches!(
            fs.create_directory("/what?"),
            Err(FsError::InvalidName(_))
        ));
        assert_eq!(fs.table().len(), 1);
    }

    #[test]
    fn create_file_through_a_file_is_a_path_conflict() {
        let mut fs = create_test_fs(8);
        fs.create_file("/a", 10).unwrap();
        assert!(matches!(
            fs.create_file("/a/b", 10),
            Err(FsError::PathConflict(p)) if p == "/a"
        ));
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut fs = create_test_fs(8);
        fs.create_file("/a", 10).unwrap();
        assert!(matches!(fs.create_file("/a", 10), Err(FsError::AlreadyExists(_))));
        assert!(matches!(fs.create_directory("/a"), Err(FsError::AlreadyExists(_))));
        assert!(matches!(fs.create_directory("/"), Err(FsError::AlreadyExists(_))));
        assert_eq!(fs.store().free_blocks(), 7);
    }

    #[test]
    fn zero_sized_file_owns_no_blocks() {
        let mut fs = create_test_fs(2);
        fs.create_file("/empty", 0).unwrap();
        assert!(fs.get_metadata("/empty").unwrap().blocks.is_empty());
        assert!(fs.read_file("/empty").unwrap().is_empty());
    }

    #[test]
    fn new_file_reads_back_as_zeros() {
        let mut fs = create_test_fs(2);
        fs.create_file("/z", 100).unwrap();
        assert_eq!(fs.read_file("/z").unwrap(), vec![0; 100]);
    }

    #[test]
    fn recreated_file_does_not_see_stale_bytes() {
        let mut fs = create_test_fs(2);
        fs.create_file("/a", BLOCK_SIZE * 2).unwrap();
        fs.write_file("/a", &vec![b'x'; BLOCK_SIZE * 2], false).unwrap();
        // Shrinking releases the second block without scrubbing it.
        fs.write_file("/a", b"y", false).unwrap();

        fs.create_file("/b", 10).unwrap();
        assert_eq!(fs.read_file("/b").unwrap(), vec![0; 10]);
    }

    #[test]
    fn create_file_over_per_file_limit_fails() {
        let mut fs = create_test_fs(4);
        assert!(matches!(
            fs.create_file("/huge", MAX_FILE_SIZE + 1),
            Err(FsError::CapacityExceeded { .. })
        ));
        assert!(fs.get_metadata("/huge").is_none());
    }

    #[test]
    fn failed_allocation_rolls_back_blocks() {
        let mut fs = create_test_fs(3);
        fs.create_file("/a", 10).unwrap();
        assert!(matches!(
            fs.create_file("/b", BLOCK_SIZE * 3),
            Err(FsError::CapacityExhausted)
        ));
        assert!(fs.get_metadata("/b").is_none());
        assert_eq!(fs.store().free_blocks(), 2);
    }

    #[test]
    fn write_past_per_file_limit_is_rejected() {
        let mut fs = create_test_fs(4);
        fs.create_file("/f", 10).unwrap();
        let data = vec![1u8; MAX_FILE_SIZE + 1];
        assert!(matches!(
            fs.write_file("/f", &data, false),
            Err(FsError::CapacityExceeded { .. })
        ));
        assert_eq!(fs.get_metadata("/f").unwrap().size, 10);
    }

    #[test]
    fn failed_write_keeps_entry_and_releases_new_blocks() {
        let mut fs = create_test_fs(3);
        fs.create_file("/f", 10).unwrap();
        fs.write_file("/f", b"original", false).unwrap();

        let data = vec![7u8; BLOCK_SIZE * 4];
        assert!(matches!(
            fs.write_file("/f", &data, false),
            Err(FsError::CapacityExhausted)
        ));
        let entry = fs.get_metadata("/f").unwrap();
        assert_eq!(entry.size, 8);
        assert_eq!(entry.blocks, vec![0]);
        assert_eq!(fs.store().free_blocks(), 2);
    }

    #[test]
    fn write_preserves_interior_zero_bytes() {
        let mut fs = create_test_fs(4);
        fs.create_file("/bin", 0).unwrap();
        let mut data = vec![0u8; BLOCK_SIZE + 10];
        data[0] = 1;
        data[BLOCK_SIZE + 2] = 2;
        fs.write_file("/bin", &data, false).unwrap();
        assert_eq!(fs.read_file("/bin").unwrap(), data);
    }

    #[test]
    fn write_of_empty_data_releases_all_blocks() {
        let mut fs = create_test_fs(4);
        fs.create_file("/f", BLOCK_SIZE * 2).unwrap();
        fs.write_file("/f", b"", false).unwrap();
        let entry = fs.get_metadata("/f").unwrap();
        assert_eq!(entry.size, 0);
        assert!(entry.blocks.is_empty());
        assert_eq!(fs.store().free_blocks(), 4);
    }

    #[test]
    fn file_operations_on_directories_fail() {
        let mut fs = create_test_fs(4);
        fs.create_directory("/d").unwrap();
        assert!(matches!(fs.read_file("/d"), Err(FsError::NotAFile(_))));
        assert!(matches!(fs.write_file("/d", b"x", false), Err(FsError::NotAFile(_))));
        assert!(matches!(fs.delete_file("/d"), Err(FsError::NotAFile(_))));
        assert!(matches!(fs.read_file("/none"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn directory_operations_on_files_fail() {
        let mut fs = create_test_fs(4);
        fs.create_file("/f", 1).unwrap();
        assert!(matches!(fs.list_directory("/f"), Err(FsError::NotADirectory(_))));
        assert!(matches!(
            fs.delete_directory("/f", true),
            Err(FsError::NotADirectory(_))
        ));
        assert!(matches!(
            fs.delete_directory("/none", true),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn root_cannot_be_deleted() {
        let mut fs = create_test_fs(4);
        assert!(matches!(
            fs.delete_directory("/", true),
            Err(FsError::RootDeletionForbidden)
        ));
        assert!(matches!(
            fs.delete_directory("/a/..", false),
            Err(FsError::RootDeletionForbidden)
        ));
        assert!(fs.get_metadata("/").unwrap().is_dir());
    }

    #[test]
    fn recursive_delete_frees_nested_blocks() {
        let mut fs = create_test_fs(8);
        fs.create_file("/d/one", 10).unwrap();
        fs.create_file("/d/sub/two", BLOCK_SIZE + 1).unwrap();
        fs.create_file("/dx", 10).unwrap();
        assert_eq!(fs.store().free_blocks(), 4);

        fs.delete_directory("/d", true).unwrap();
        assert_eq!(fs.store().free_blocks(), 7);
        assert_eq!(fs.list_directory("/").unwrap(), vec!["dx".to_string()]);
    }

    #[test]
    fn delete_file_accepts_unresolved_paths() {
        let mut fs = create_test_fs(4);
        fs.create_file("/d/f", 10).unwrap();
        fs.delete_file("/d/./x/../f").unwrap();
        assert!(fs.get_metadata("/d/f").is_none());
        assert_eq!(fs.store().free_blocks(), 4);
    }

    #[test]
    fn move_file_requires_existing_parent() {
        let mut fs = create_test_fs(4);
        fs.create_file("/m", 10).unwrap();
        assert!(matches!(
            fs.move_file("/m", "/nowhere/m"),
            Err(FsError::NotFound(p)) if p == "/nowhere"
        ));
        assert!(matches!(
            fs.move_file("/m", "/./m"),
            Err(FsError::InvalidArgument(_))
        ));
        assert!(fs.get_metadata("/m").is_some());
    }

    #[test]
    fn move_file_into_existing_name_fails_without_touching_source() {
        let mut fs = create_test_fs(4);
        fs.create_file("/a", 10).unwrap();
        fs.create_file("/b", 10).unwrap();
        assert!(matches!(fs.move_file("/a", "/b"), Err(FsError::AlreadyExists(_))));
        assert!(fs.get_metadata("/a").is_some());
        assert_eq!(fs.store().free_blocks(), 2);
    }

    #[test]
    fn move_directory_moves_whole_tree() {
        let mut fs = create_test_fs(8);
        fs.create_file("/src/a", 0).unwrap();
        fs.write_file("/src/a", b"alpha", false).unwrap();
        fs.create_file("/src/deep/b", 0).unwrap();
        fs.write_file("/src/deep/b", b"beta", false).unwrap();

        fs.move_directory("/src", "/dst").unwrap();

        assert!(fs.get_metadata("/src").is_none());
        assert!(fs.get_metadata("/src/deep/b").is_none());
        assert_eq!(fs.read_file("/dst/a").unwrap(), b"alpha".to_vec());
        assert_eq!(fs.read_file("/dst/deep/b").unwrap(), b"beta".to_vec());
        assert_eq!(fs.store().free_blocks(), 6);
    }

    #[test]
    fn move_directory_into_itself_is_rejected() {
        let mut fs = create_test_fs(4);
        fs.create_directory("/a").unwrap();
        assert!(matches!(
            fs.move_directory("/a", "/a/b"),
            Err(FsError::InvalidArgument(_))
        ));
        assert!(matches!(
            fs.move_directory("/", "/x"),
            Err(FsError::InvalidArgument(_))
        ));
        assert!(fs.get_metadata("/a/b").is_none());
    }

    #[test]
    fn rename_keeps_blocks_in_place() {
        let mut fs = create_test_fs(4);
        fs.create_file("/d/old", 0).unwrap();
        fs.write_file("/d/old", b"payload", false).unwrap();
        let blocks = fs.get_metadata("/d/old").unwrap().blocks.clone();

        fs.rename_path("/d/old", "new").unwrap();

        assert!(fs.get_metadata("/d/old").is_none());
        let renamed = fs.get_metadata("/d/new").unwrap();
        assert_eq!(renamed.blocks, blocks);
        assert_eq!(fs.read_file("/d/new").unwrap(), b"payload".to_vec());
    }

    #[test]
    fn rename_directory_rekeys_children() {
        let mut fs = create_test_fs(4);
        fs.create_file("/top/inner/f", 1).unwrap();
        fs.rename_path("/top", "renamed").unwrap();

        assert_eq!(fs.list_directory("/").unwrap(), vec!["renamed".to_string()]);
        assert!(fs.get_metadata("/renamed/inner").unwrap().is_dir());
        assert!(fs.get_metadata("/renamed/inner/f").unwrap().is_file());
        assert!(fs.table().descendants("/top").is_empty());
    }

    #[test]
    fn rename_rejects_conflicts_and_bad_names() {
        let mut fs = create_test_fs(4);
        fs.create_file("/a", 1).unwrap();
        fs.create_file("/b", 1).unwrap();
        assert!(matches!(fs.rename_path("/a", "b"), Err(FsError::AlreadyExists(_))));
        assert!(matches!(fs.rename_path("/a", "x/y"), Err(FsError::InvalidName(_))));
        assert!(matches!(fs.rename_path("/a", ".."), Err(FsError::InvalidName(_))));
        assert!(matches!(fs.rename_path("/missing", "c"), Err(FsError::NotFound(_))));
        assert!(matches!(fs.rename_path("/", "c"), Err(FsError::InvalidArgument(_))));
    }

    #[test]
    fn load_rejects_garbage_without_changing_state() {
        let mut fs = create_test_fs(4);
        fs.create_file("/keep", 1).unwrap();
        assert!(matches!(fs.load(&[1, 2, 3]), Err(FsError::CorruptImage(_))));
        assert!(fs.get_metadata("/keep").is_some());
    }

    #[test]
    fn load_heals_missing_root() {
        let mut source = create_test_fs(2);
        source.create_directory("/d").unwrap();
        let mut image = ImageWriter::new();
        image.put_len(1);
        image.put_len(2);
        image.put_bytes(b"/d");
        image.put_u8(EntryKind::Directory.to_byte());
        image.put_len(0);
        image.put_len(0);
        source.store.persist(&mut image).unwrap();

        let mut fs = create_test_fs(2);
        fs.load(&image.into_inner()).unwrap();
        assert!(fs.get_metadata("/").unwrap().is_dir());
        assert_eq!(fs.list_directory("/").unwrap(), vec!["d".to_string()]);
    }

    #[test]
    fn load_heals_file_root_without_leaking_blocks() {
        let mut source = create_test_fs(2);
        let blocknr = source.store.allocate().unwrap();
        source.store.write(blocknr, b"stale").unwrap();
        let mut image = ImageWriter::new();
        image.put_len(1);
        image.put_len(1);
        image.put_bytes(b"/");
        image.put_u8(EntryKind::File.to_byte());
        image.put_len(5);
        image.put_len(1);
        image.put_len(blocknr);
        source.store.persist(&mut image).unwrap();

        let mut fs = create_test_fs(2);
        fs.load(&image.into_inner()).unwrap();
        assert!(fs.get_metadata("/").unwrap().is_dir());
        assert_eq!(fs.store().free_blocks(), 2);
        assert!(fs.store().is_free(blocknr).unwrap());

        fs.create_file("/a", 1).unwrap();
        fs.create_file("/b", 1).unwrap();
    }

    #[test]
    fn move_directory_carries_implied_intermediate_paths() {
        let mut fs = create_test_fs(4);
        fs.create_file("/src/mid/f", 0).unwrap();
        fs.write_file("/src/mid/f", b"nested", false).unwrap();
        fs.table.remove("/src/mid");

        fs.move_directory("/src", "/dst").unwrap();

        assert!(fs.get_metadata("/src").is_none());
        assert!(fs.get_metadata("/src/mid/f").is_none());
        assert!(fs.get_metadata("/dst/mid").unwrap().is_dir());
        assert_eq!(fs.read_file("/dst/mid/f").unwrap(), b"nested".to_vec());
    }

    #[test]
    fn load_rejects_entries_pointing_at_free_blocks() {
        let mut source = create_test_fs(2);
        let mut image = ImageWriter::new();
        image.put_len(1);
        image.put_len(2);
        image.put_bytes(b"/f");
        image.put_u8(EntryKind::File.to_byte());
        image.put_len(3);
        image.put_len(1);
        image.put_len(1);
        source.store.persist(&mut image).unwrap();

        let mut fs = create_test_fs(2);
        assert!(matches!(
            fs.load(&image.into_inner()),
            Err(FsError::CorruptImage(_))
        ));
    }

    #[test]
    fn load_rejects_unknown_kind() {
        let mut image = ImageWriter::new();
        image.put_len(1);
        image.put_len(1);
        image.put_bytes(b"/");
        image.put_u8(9);
        let mut fs = create_test_fs(2);
        assert!(matches!(
            fs.load(&image.into_inner()),
            Err(FsError::CorruptImage(_))
        ));
    }
}

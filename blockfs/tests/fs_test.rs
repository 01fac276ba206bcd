use blockfs::io::{BlockStorage, FileBlockEmulator, FileBlockEmulatorBuilder};
use blockfs::{FileSystem, FsError, BLOCK_SIZE};
use tempfile::NamedTempFile;

fn create_fs(blocks: usize) -> FileSystem<FileBlockEmulator> {
    let dev = FileBlockEmulatorBuilder::from(tempfile::tempfile().unwrap())
        .with_block_count(blocks)
        .build()
        .unwrap();
    FileSystem::new(dev)
}

#[test]
fn create_file_creates_missing_parents() {
    let mut fs = create_fs(16);
    fs.create_file("/a/b.txt", 10).unwrap();

    assert!(fs.get_metadata("/a").unwrap().is_dir());
    let file = fs.get_metadata("/a/b.txt").unwrap();
    assert!(file.is_file());
    assert_eq!(file.size, 10);
    assert_eq!(file.blocks.len(), 1);
}

#[test]
fn append_extends_existing_content() {
    let mut fs = create_fs(16);
    fs.create_file("/f", 100).unwrap();
    fs.write_file("/f", b"Hello, ", false).unwrap();
    fs.write_file("/f", b"World!", true).unwrap();

    assert_eq!(fs.read_file("/f").unwrap(), b"Hello, World!".to_vec());
}

#[test]
fn non_recursive_delete_of_populated_directory_fails() {
    let mut fs = create_fs(16);
    fs.create_directory("/d").unwrap();
    fs.create_file("/d/x", 50).unwrap();

    assert!(matches!(
        fs.delete_directory("/d", false),
        Err(FsError::DirectoryNotEmpty(_))
    ));
    assert!(fs.get_metadata("/d/x").is_some());

    fs.delete_directory("/d", true).unwrap();
    assert!(fs.get_metadata("/d").is_none());
    assert!(fs.get_metadata("/d/x").is_none());
}

#[test]
fn move_file_copies_content_and_removes_source() {
    let mut fs = create_fs(16);
    fs.create_file("/m", 100).unwrap();
    fs.write_file("/m", b"Hello, World!", false).unwrap();
    fs.create_directory("/box").unwrap();

    fs.move_file("/m", "/box/m").unwrap();

    assert!(fs.get_metadata("/m").is_none());
    assert_eq!(fs.read_file("/box/m").unwrap(), b"Hello, World!".to_vec());
    assert_eq!(fs.list_directory("/box").unwrap(), vec!["m".to_string()]);
}

#[test]
fn shrinking_a_file_returns_blocks_to_the_store() {
    let mut fs = create_fs(5);
    fs.create_file("/x", BLOCK_SIZE * 2 + 1).unwrap();
    assert_eq!(fs.get_metadata("/x").unwrap().blocks.len(), 3);

    fs.write_file("/x", b"z", false).unwrap();
    assert_eq!(fs.get_metadata("/x").unwrap().blocks.len(), 1);

    // Four blocks are free again: exhaust them one file at a time.
    for i in 0..4 {
        fs.create_file(&format!("/fill{}", i), 1).unwrap();
    }
    assert!(matches!(
        fs.create_file("/one-too-many", 1),
        Err(FsError::CapacityExhausted)
    ));
    assert!(fs.get_metadata("/one-too-many").is_none());
}

#[test]
fn listing_shows_only_immediate_children() {
    let mut fs = create_fs(16);
    fs.create_file("/docs/a.txt", 1).unwrap();
    fs.create_file("/docs/sub/b.txt", 1).unwrap();
    fs.create_directory("/docs/empty").unwrap();
    fs.create_directory("/docsx").unwrap();

    assert_eq!(
        fs.list_directory("/docs").unwrap(),
        vec!["a.txt".to_string(), "empty".to_string(), "sub".to_string()]
    );
    assert_eq!(
        fs.list_directory("/").unwrap(),
        vec!["docs".to_string(), "docsx".to_string()]
    );
    assert_eq!(fs.list_directory("/docs/sub/..").unwrap().len(), 3);
}

#[test]
fn save_and_load_reproduce_the_tree() {
    let mut fs = create_fs(32);
    fs.create_file("/notes/today.txt", 0).unwrap();
    fs.write_file("/notes/today.txt", b"buy milk", false).unwrap();
    let big: Vec<u8> = (0..BLOCK_SIZE * 2 + 17).map(|i| (i % 251) as u8).collect();
    fs.create_file("/data/big.bin", 0).unwrap();
    fs.write_file("/data/big.bin", &big, false).unwrap();
    fs.create_directory("/empty").unwrap();
    let image = fs.save().unwrap();

    let mut restored = create_fs(32);
    restored.load(&image).unwrap();

    assert_eq!(restored.read_file("/notes/today.txt").unwrap(), b"buy milk".to_vec());
    assert_eq!(restored.read_file("/data/big.bin").unwrap(), big);
    assert_eq!(
        restored.list_directory("/").unwrap(),
        fs.list_directory("/").unwrap()
    );
    assert!(restored.list_directory("/empty").unwrap().is_empty());
    assert_eq!(restored.store().bitmap(), fs.store().bitmap());
}

#[test]
fn load_into_smaller_device_is_corrupt() {
    let mut fs = create_fs(8);
    fs.create_file("/f", 1).unwrap();
    let image = fs.save().unwrap();

    let mut other = create_fs(4);
    assert!(matches!(other.load(&image), Err(FsError::CorruptImage(_))));
}

#[test]
fn can_reopen_disk_and_image_from_files() {
    let disk = NamedTempFile::new().unwrap();
    let image_file = NamedTempFile::new().unwrap();

    {
        let dev = FileBlockEmulatorBuilder::from(disk.reopen().unwrap())
            .with_block_count(8)
            .build()
            .unwrap();
        let mut fs = FileSystem::new(dev);
        fs.create_file("/persist.txt", 0).unwrap();
        fs.write_file("/persist.txt", b"still here", false).unwrap();
        std::fs::write(image_file.path(), fs.save().unwrap()).unwrap();
    }

    let dev = FileBlockEmulator::open_disk(disk.path(), 8).unwrap();
    let mut fs = FileSystem::new(dev);
    fs.load(&std::fs::read(image_file.path()).unwrap()).unwrap();
    fs.initialize_file_system();
    assert_eq!(fs.read_file("/persist.txt").unwrap(), b"still here".to_vec());
}

#[test]
fn root_survives_every_delete_attempt() {
    let mut fs = create_fs(4);
    fs.create_file("/a", 1).unwrap();
    for recursive in [false, true] {
        assert!(matches!(
            fs.delete_directory("/", recursive),
            Err(FsError::RootDeletionForbidden)
        ));
    }
    assert!(fs.get_metadata("/").unwrap().is_dir());
    assert!(fs.get_metadata("/a").is_some());
}

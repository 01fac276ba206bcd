use blockfs::io::{BlockStorage, FileBlockEmulatorBuilder};
use blockfs::BlockStore;
use std::env;

/// Allocates and fills a handful of blocks on a scratch device, then prints the
/// resulting bitmap. Pass a block count as the first argument.
pub fn main() -> Result<(), blockfs::FsError> {
    let blocks = env::args()
        .nth(1)
        .and_then(|arg| arg.parse::<usize>().ok())
        .unwrap_or(8);

    let dev = FileBlockEmulatorBuilder::from(tempfile::tempfile()?)
        .with_block_count(blocks)
        .build()?;
    println!("device has {} blocks", dev.block_count());

    let mut store = BlockStore::new(dev);
    for i in 0..blocks / 2 {
        let blocknr = store.allocate()?;
        store.write(blocknr, format!("block {}", i).as_bytes())?;
    }
    println!("bitmap: {:?}", store.bitmap().serialize());
    println!("{} blocks free", store.free_blocks());
    Ok(())
}

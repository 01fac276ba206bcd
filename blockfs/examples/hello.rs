use blockfs::io::FileBlockEmulatorBuilder;
use blockfs::FileSystem;

pub fn main() -> Result<(), blockfs::FsError> {
    let tmp = tempfile::tempfile()?;
    let dev = FileBlockEmulatorBuilder::from(tmp)
        .with_block_count(64)
        .build()?;

    // create a new file system on the device and write to a nested file
    let mut fs = FileSystem::new(dev);
    fs.create_file("/greetings/hello.txt", 0)?;
    fs.write_file("/greetings/hello.txt", b"Hello, ", false)?;
    fs.write_file("/greetings/hello.txt", b"World!", true)?;

    let content = fs.read_file("/greetings/hello.txt")?;
    println!("{}", String::from_utf8_lossy(&content));
    println!("/ contains {:?}", fs.list_directory("/")?);
    Ok(())
}

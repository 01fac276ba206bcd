mod command;
mod shell;

use anyhow::Context;
use blockfs::io::{BlockStorage, FileBlockEmulator, FileBlockEmulatorBuilder};
use blockfs::FileSystem;
use clap::Parser;
use log::{error, info, warn};
use shell::Shell;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(about = "Interactive shell over a block file system emulated in a host file")]
struct Args {
    /// Host file emulating the block device
    #[arg(short, long, default_value = "cli_disk.dat")]
    disk: PathBuf,

    /// File holding the saved file system metadata
    #[arg(short, long, default_value = "filesystem.dat")]
    image: PathBuf,

    /// Number of blocks on the device
    #[arg(short, long, default_value_t = 256)]
    blocks: usize,
}

fn open_device(path: &Path, blocks: usize) -> anyhow::Result<FileBlockEmulator> {
    if path.exists() {
        info!("attaching existing disk {:?}", path);
        return FileBlockEmulator::open_disk(path, blocks)
            .with_context(|| format!("failed to open disk {:?}", path));
    }

    info!("creating disk {:?} with {} blocks", path, blocks);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .with_context(|| format!("failed to create disk {:?}", path))?;
    FileBlockEmulatorBuilder::from(file)
        .with_block_count(blocks)
        .build()
        .with_context(|| format!("failed to initialize disk {:?}", path))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let dev = open_device(&args.disk, args.blocks)?;
    let mut fs = FileSystem::new(dev);

    if args.image.exists() {
        let image = std::fs::read(&args.image)
            .with_context(|| format!("failed to read image {:?}", args.image))?;
        if image.is_empty() {
            warn!("image {:?} is empty, starting fresh", args.image);
        } else {
            fs.load(&image)
                .with_context(|| format!("failed to load image {:?}", args.image))?;
        }
    }
    fs.initialize_file_system();

    let mut shell = Shell::new(fs);
    let session = shell.run(io::stdin().lock(), &mut io::stdout(), &mut io::stderr());
    if let Err(e) = &session {
        error!("shell stopped early: {:#}", e);
    }

    let mut fs = shell.into_fs();
    let image = fs.save()?;
    std::fs::write(&args.image, image)
        .with_context(|| format!("failed to write image {:?}", args.image))?;
    fs.into_store().into_device().sync_disk()?;
    info!("saved file system to {:?}", args.image);
    session
}

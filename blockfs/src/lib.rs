//! A small block oriented storage engine emulated inside a single host file, with
//! a path keyed file and directory layer on top.
//!
//! ```no_run
//! use blockfs::io::FileBlockEmulatorBuilder;
//! use blockfs::FileSystem;
//!
//! let dev = FileBlockEmulatorBuilder::from(tempfile::tempfile().unwrap())
//!     .with_block_count(64)
//!     .build()
//!     .unwrap();
//! let mut fs = FileSystem::new(dev);
//! fs.create_file("/docs/hello.txt", 0).unwrap();
//! fs.write_file("/docs/hello.txt", b"Hello, World!", false).unwrap();
//! let image = fs.save().unwrap();
//! # drop(image);
//! ```

pub mod alloc;
pub mod error;
mod fs;
pub mod image;
pub mod io;
pub mod path;
pub mod store;
pub mod table;

pub use crate::error::{FsError, Result};
pub use crate::fs::{FileSystem, BLOCK_SIZE, MAX_BLOCKS, MAX_FILE_SIZE};
pub use crate::store::BlockStore;
pub use crate::table::{Entry, EntryKind, FileTable};
